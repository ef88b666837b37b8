//! Live metrics stream over WebSocket.
//!
//! Each connection gets one bootstrap frame holding the current rolling
//! window, then live frames as snapshots and alerts are published. Live
//! snapshots the bootstrap already covers are identified by window
//! sequence and dropped here instead of duplicated on the wire.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use pulse_core::observability::metrics as obs;
use pulse_core::{BootstrapView, LiveEvent, MetricSnapshot};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::server::SharedState;

/// GET /ws/metrics - upgrade to the live stream.
pub async fn metrics_stream(ws: WebSocketUpgrade, State(state): State<SharedState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: SharedState) {
    let session = Uuid::new_v4();

    // Subscribe before capturing the window so nothing published in
    // between can fall through the splice.
    let mut subscriber = state.pipeline.hub().subscribe();
    let view = state.pipeline.window().bootstrap_view().await;

    if socket
        .send(Message::Text(bootstrap_frame(&view)))
        .await
        .is_err()
    {
        return;
    }
    info!(%session, snapshots = view.snapshots.len(), "live subscriber connected");
    obs::set_live_subscribers(state.pipeline.hub().subscriber_count());

    loop {
        tokio::select! {
            event = subscriber.recv() => match event {
                Ok(Some(event)) => {
                    let Some(frame) = live_frame(&event, view.last_seq) else {
                        continue;
                    };
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                // Hub closed; the daemon is shutting down.
                Ok(None) => break,
                Err(e) => {
                    debug!(%session, error = %e, "subscriber lagged, resuming from oldest buffered event");
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Clients have nothing to say on this stream.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(%session, error = %e, "websocket read failed");
                    break;
                }
            },
        }
    }

    drop(subscriber);
    info!(%session, "live subscriber disconnected");
    obs::set_live_subscribers(state.pipeline.hub().subscriber_count());
}

/// Frame sent once on connect with the current rolling window.
fn bootstrap_frame(view: &BootstrapView) -> String {
    let snapshots: Vec<&MetricSnapshot> = view.snapshots.iter().map(|s| s.as_ref()).collect();
    json!({ "type": "bootstrap", "snapshots": snapshots }).to_string()
}

/// Encode one live event, or `None` when the bootstrap already covers it.
fn live_frame(event: &LiveEvent, bootstrap_seq: u64) -> Option<String> {
    match event {
        LiveEvent::Snapshot { seq, .. } if *seq <= bootstrap_seq => None,
        LiveEvent::Snapshot { snapshot, .. } => {
            Some(json!({ "type": "metric", "snapshot": snapshot.as_ref() }).to_string())
        }
        LiveEvent::Alert(alert) => Some(json!({ "type": "alert", "alert": alert }).to_string()),
    }
}
