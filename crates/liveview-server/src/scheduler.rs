//! Per-session timed callbacks.
//!
//! Each session gets one task that fires the first-contact callback once
//! after the settle delay and the tick callback on every interval after
//! that. The task exits as soon as the session's cancellation token fires;
//! a callback still running at that point is dropped.

use std::sync::Arc;
use std::time::Duration;

use futures::future;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, instrument};

use crate::fault::contain;
use crate::session::{FIRST_CONTACT_MESSAGE, FirstContact, MIN_TICK_INTERVAL, Session};

/// Why the scheduler stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// The session's cancellation token fired.
    Cancelled,
    /// The session left the running state between wakeups.
    NotRunning,
}

/// Spawn the scheduler for `session`.
pub(crate) fn spawn(session: Arc<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let exit = run_scheduler(session).await;
        debug!(?exit, "scheduler stopped");
    })
}

/// Drive the session's first-contact and tick callbacks until teardown.
#[instrument(skip_all, fields(session_id = %session.id()))]
pub async fn run_scheduler(session: Arc<Session>) -> SchedulerExit {
    let cancel = session.cancellation().clone();
    let settle = time::sleep(session.config().settle_delay);
    tokio::pin!(settle);
    let mut first_contact_pending = true;

    let period = session
        .hooks()
        .tick_interval()
        .unwrap_or(session.config().tick_interval);
    let mut ticker = ticker(period);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return SchedulerExit::Cancelled,
            () = &mut settle, if first_contact_pending => {
                first_contact_pending = false;
                if !session.is_running() {
                    return SchedulerExit::NotRunning;
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return SchedulerExit::Cancelled,
                    _ = contain("first_contact", first_contact(&session)) => {}
                }
            }
            () = next_tick(&mut ticker) => {
                if !session.is_running() {
                    return SchedulerExit::NotRunning;
                }
                let tick = async { (session.hooks().on_tick)(Arc::clone(&session)).await };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return SchedulerExit::Cancelled,
                    _ = contain("tick", tick) => {}
                }
            }
        }
    }
}

/// Ticker for `period`, or `None` when the first tick lies beyond what
/// the clock can represent.
fn ticker(period: Duration) -> Option<Interval> {
    let period = period.max(MIN_TICK_INTERVAL);
    let start = Instant::now().checked_add(period)?;
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(ticker)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            let _ = ticker.tick().await;
        }
        None => future::pending().await,
    }
}

async fn first_contact(session: &Arc<Session>) {
    match &session.hooks().first_contact {
        FirstContact::BroadcastAll => {
            let _ = session
                .registry()
                .broadcast(Value::from(FIRST_CONTACT_MESSAGE))
                .await;
        }
        FirstContact::NotifySelf => {
            let _ = session
                .registry()
                .send_to(Value::from(FIRST_CONTACT_MESSAGE), &[session.id()])
                .await;
        }
        FirstContact::Custom(callback) => callback(Arc::clone(session)).await,
    }
}
