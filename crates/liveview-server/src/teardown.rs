//! Session teardown.
//!
//! Runs at most once per session regardless of how many paths request it
//! (socket close, read error, shutdown). Steps, in order:
//!
//! 1. unregister from the bus
//! 2. run the destroy callback
//! 3. cancel the scheduler and fail every pending query
//! 4. release the outbound queue
//!
//! Each step is contained so a fault in one never skips the next.

use std::sync::Arc;

use metrics::gauge;
use tracing::{debug, info, instrument, warn};

use crate::fault::{contain, contain_sync};
use crate::metrics::SESSIONS_ACTIVE;
use crate::session::Session;

/// Tear `session` down. Returns `false` if another caller already did.
#[instrument(skip_all, fields(session_id = %session.id()))]
pub async fn run(session: &Arc<Session>) -> bool {
    if !session.begin_closing() {
        debug!("teardown already ran");
        return false;
    }

    let unregistered = contain_sync("teardown_unregister", || {
        session.registry().unregister(session.id())
    });
    if unregistered != Some(true) {
        warn!("session was not registered at teardown");
    }

    let destroyed = contain("destroy_callback", async {
        (session.hooks().on_destroy)(session.id().clone(), Arc::clone(session.registry())).await;
    })
    .await;
    if destroyed.is_none() {
        warn!("destroy callback panicked");
    }

    let cancelled = contain_sync("teardown_cancel", || {
        session.cancellation().cancel();
        session.pending().cancel_all()
    });

    let _ = contain_sync("teardown_outbound", || session.outbound().close());

    session.mark_closed();
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    info!(
        pending_cancelled = cancelled.unwrap_or_default(),
        dropped_frames = session.outbound().drop_count(),
        "session torn down"
    );
    true
}
