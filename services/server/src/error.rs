//! Fallible-boundary error types (§7). `Cell`/`Derived`/`Effect` operations
//! are infallible per spec, so there is deliberately no `CellError` here —
//! these are the four boundaries that actually fail: protocol decoding,
//! rendering, pluggable storage, and session lookup.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template render failed for {path}: {source}")]
    TemplateFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("route {0} is not registered")]
    RouteNotRegistered(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session token not found or expired")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no action handler registered for {0:?}")]
    NotFound(String),
}
