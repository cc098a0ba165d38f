//! Server-Sent Events for live UI updates.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::state::{AppEvent, SharedState};

fn to_event(event: &AppEvent) -> Option<Event> {
    Event::default()
        .event(event_name(event))
        .json_data(event)
        .map_err(|e| tracing::warn!(error = %e, "Could not encode SSE event"))
        .ok()
}

fn event_name(event: &AppEvent) -> &'static str {
    match event {
        AppEvent::AnalysisCompleted { .. } => "analysis_completed",
        AppEvent::ReportGenerated { .. } => "report_generated",
        AppEvent::AnalysisDeleted { .. } => "analysis_deleted",
    }
}

/// GET /api/events
pub async fn sse_handler(State(state): State<SharedState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.subscribe()).filter_map(|received| match received {
        Ok(event) => to_event(&event).map(Ok),
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::debug!(skipped = n, "SSE client lagged");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}
