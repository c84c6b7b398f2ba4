use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON body shape for HTTP error responses, shared by every route the
/// server exposes outside the duplex protocol (none of the page-render
/// routes use this — only administrative/HTTP-surface failures do).
///
/// Grounded on `services/server/src/http/response.rs`'s
/// `HttpErrorEnvelope`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpErrorEnvelope {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl HttpErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
