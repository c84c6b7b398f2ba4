//! `/events` (§4.11 `[SUPPLEMENT]`): server-sent events feed of
//! `RenderEvent`s, for a dashboard or log tail watching cache activity.
//! Grounded on the teacher's `http/sse.rs` (`BroadcastStream` filtered into
//! `Event`s, `KeepAlive` text ping), reused here for render cache
//! observability instead of race-timing dashboard events.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::render::RenderEvent;
use crate::state::AppState;

pub async fn render_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.render.subscribe_events();
    let stream = BroadcastStream::new(rx).filter_map(|msg| async move {
        let event = msg.ok()?;
        Some(Ok(Event::default()
            .event(event_kind(&event))
            .data(event_payload(&event))))
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

fn event_kind(event: &RenderEvent) -> &'static str {
    match event {
        RenderEvent::Rendered { .. } => "rendered",
        RenderEvent::Revalidated { .. } => "revalidated",
        RenderEvent::Evicted { .. } => "evicted",
    }
}

fn event_payload(event: &RenderEvent) -> String {
    match event {
        RenderEvent::Rendered { path, strategy } => {
            format!(r#"{{"path":{path:?},"strategy":"{strategy}"}}"#)
        }
        RenderEvent::Revalidated { path } => format!(r#"{{"path":{path:?}}}"#),
        RenderEvent::Evicted { path } => format!(r#"{{"path":{path:?}}}"#),
    }
}
