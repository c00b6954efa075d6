//! `GET /api/chat/{id}/stream`: chat events over Server-Sent Events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval_at, Instant};

use endstate_core::ChatEvent;

use super::{parse_session, ApiError};
use crate::state::AppState;

pub async fn stream(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = parse_session(&raw)?;
    let session = state.sessions.get_or_create(&session_id).await;
    let period = Duration::from_secs(state.config.server.heartbeat_secs.max(1));
    let mut shutdown = state.sessions.shutdown_signal();

    tracing::debug!(session_id = %session_id, "SSE subscriber connected");

    let events = async_stream::stream! {
        let (mut rx, messages, processing) = session.subscribe().await;
        yield Ok(sse_event(&ChatEvent::InitialMessages { messages, processing }));

        let mut heartbeat = interval_at(Instant::now() + period, period);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(session_id = %session.id(), skipped, "SSE subscriber lagged; resynchronizing");
                        let (messages, processing) = session.snapshot(None).await;
                        Some(ChatEvent::InitialMessages { messages, processing })
                    }
                    Err(RecvError::Closed) => None,
                },
                _ = heartbeat.tick() => Some(ChatEvent::heartbeat()),
                _ = shutdown.changed() => None,
            };
            match next {
                Some(event) => yield Ok(sse_event(&event)),
                None => break,
            }
        }
        tracing::debug!(session_id = %session.id(), "SSE stream closed");
    };

    Ok(Sse::new(events))
}

/// `event:` carries the event name, `data:` the JSON payload.
fn sse_event(event: &ChatEvent) -> Event {
    Event::default()
        .event(event.name())
        .json_data(event)
        .unwrap_or_else(|e| {
            tracing::error!(event = event.name(), error = %e, "Failed to encode SSE event");
            Event::default()
                .event("error")
                .data(r#"{"message":"event encoding failed"}"#)
        })
}
