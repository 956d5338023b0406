//! Connection lifecycle: a connected client from upgrade through disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;
use crate::fault::contain_sync;
use crate::metrics::{
    SESSION_FRAMES_DROPPED_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::registry::SessionRegistry;
use crate::session::{Invocation, Outbound, Routed, Session, SessionFactory};

/// How long the writer may keep flushing queued frames after teardown.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a connection needs from the server.
#[derive(Clone)]
pub struct ConnectionContext {
    /// Builds the session for each connection.
    pub factory: Arc<dyn SessionFactory>,
    /// Process-wide session bus.
    pub registry: Arc<SessionRegistry>,
    /// Session timing.
    pub session: SessionConfig,
    /// Outbound queue capacity.
    pub outbound_buffer: usize,
}

/// Run a WebSocket connection for a connected client.
///
/// 1. Builds the session from the factory and commits its components
/// 2. Forwards queued frames to the socket from a writer task
/// 3. Fulfills query responses inline and hands events to a dispatcher
///    task, so a handler waiting on a query never blocks the reader
/// 4. Tears the session down when the socket closes or errors
#[instrument(skip_all, fields(session_id))]
pub async fn run_ws_session(ws: WebSocket, ctx: ConnectionContext) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(ctx.outbound_buffer.max(1));

    let Some(spec) = contain_sync("session_factory", || ctx.factory.create()) else {
        let _ = ws_tx.close().await;
        return;
    };
    let session = match Session::create(
        spec,
        Arc::clone(&ctx.registry),
        Outbound::new(send_tx),
        ctx.session.clone(),
    ) {
        Ok(session) => session,
        Err(error) => {
            warn!(%error, "rejecting connection");
            let _ = ws_tx.close().await;
            return;
        }
    };
    let _ = tracing::Span::current().record("session_id", session.id().as_str());

    let connection_start = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    // Writer: sole owner of the sink. Ends once the outbound sender is
    // released at teardown and the queue is drained.
    let writer = tokio::spawn(async move {
        while let Some(text) = send_rx.recv().await {
            if ws_tx.send(Message::Text(Arc::unwrap_or_clone(text).into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Dispatcher: runs handlers one at a time, in arrival order.
    let (dispatch_tx, mut dispatch_rx) = mpsc::unbounded_channel::<Invocation>();
    let dispatch_session = Arc::clone(&session);
    let dispatcher = tokio::spawn(async move {
        while let Some(invocation) = dispatch_rx.recv().await {
            let outcome = dispatch_session.dispatch(invocation).await;
            debug!(?outcome, "event dispatched");
        }
    });

    while let Some(frame) = ws_rx.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(error) => {
                info!(%error, "socket read failed");
                break;
            }
        };
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    counter!(SESSION_FRAMES_DROPPED_TOTAL, "reason" => "binary").increment(1);
                    debug!(len = data.len(), "dropping non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match session.route_frame(&text) {
            Routed::Invoke(invocation) => {
                if dispatch_tx.send(invocation).is_err() {
                    break;
                }
            }
            Routed::Handled(outcome) => debug!(?outcome, "frame handled"),
        }
    }

    drop(dispatch_tx);
    let _ = session.close().await;

    info!("client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection_start.elapsed().as_secs_f64());

    let writer_abort = writer.abort_handle();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("writer did not drain in time");
        writer_abort.abort();
    }
    // A handler still running finds the session closed; it is left to finish.
    drop(dispatcher);
}
