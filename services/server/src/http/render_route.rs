//! The generic page-render fallback route (§4.10): dispatches whatever path
//! arrived to the `RenderPipeline` and turns the result into an HTTP
//! response carrying the strategy's caching header. Grounded on the
//! teacher's `http/streams.rs` `Path`/`State`/`Json` handler shape,
//! generalized from a fixed set of named routes to a catch-all since which
//! path maps to which page is an external collaborator's concern (§1).

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::error::RenderError;
use crate::state::AppState;

use super::response::{internal_error, not_found};

pub async fn render_page(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let path = uri.path();
    let params = Value::Object(params.into_iter().map(|(k, v)| (k, Value::String(v))).collect());

    match state.render.render(path, &params).await {
        Ok(response) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/html; charset=utf-8".to_owned()),
                (header::CACHE_CONTROL, response.cache_control),
            ],
            response.body,
        )
            .into_response(),
        Err(RenderError::RouteNotRegistered(path)) => {
            not_found(format!("no route registered for {path}"))
        }
        Err(err @ RenderError::TemplateFailed { .. }) => internal_error(err),
    }
}
