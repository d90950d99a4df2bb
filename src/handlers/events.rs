use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use super::admin::authenticate;
use crate::errors::AppResult;
use crate::models::{AdminRole, QueueEvent};
use crate::services::queue;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

fn to_sse(event: &QueueEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.name()).data(data)
}

// GET /api/admin/events?token= (EventSource cannot set headers)
pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    authenticate(
        &state,
        query.token.as_deref().unwrap_or("").trim(),
        &[AdminRole::Admin, AdminRole::Staff, AdminRole::CustomerService],
    )?;

    // Subscribe before the snapshot so no update falls between them
    let rx = state.events_tx.subscribe();

    let snapshot = {
        let conn = state.conn()?;
        QueueEvent::QueueUpdated {
            queue: queue::current_queue(&conn, &state.config.queue)?,
        }
    };

    let initial = tokio_stream::iter([Ok::<_, Infallible>(to_sse(&snapshot))]);

    let live = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(to_sse(&event))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event stream subscriber lagged");
            None
        }
    });

    let keepalive = IntervalStream::new(tokio::time::interval(Duration::from_secs(30)))
        .map(|_| Ok::<_, Infallible>(Event::default().comment("keepalive")));

    Ok(Sse::new(initial.chain(live).merge(keepalive)))
}
