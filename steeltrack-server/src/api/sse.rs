//! Server-Sent Events stream of committed transitions
//!
//! Bridges the EventBus to subscribed viewers. The stream is read-side only:
//! it can lag or drop without ever affecting the write path.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to transition events");
    let mut rx = state.events.subscribe();

    let stream = async_stream::stream! {
        // Send initial connected status
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match tokio::time::timeout(Duration::from_secs(15), rx.recv()).await {
                Ok(Ok(event)) => {
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            yield Ok(Event::default().event(event.event_type()).data(data));
                        }
                        Err(e) => warn!("SSE: failed to serialize event: {}", e),
                    }
                }
                Ok(Err(RecvError::Lagged(skipped))) => {
                    // Slow consumer fell behind the bus; tell it so it can
                    // re-query current state
                    warn!("SSE client lagged, {} events dropped", skipped);
                    yield Ok(Event::default().event("Lagged").data(skipped.to_string()));
                }
                Ok(Err(RecvError::Closed)) => break,
                Err(_elapsed) => {
                    debug!("SSE: sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
