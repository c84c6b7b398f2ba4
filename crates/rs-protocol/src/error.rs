use thiserror::Error;

/// Failures in decoding or validating a wire frame. Every variant maps to
/// the Protocol-error row of the error-handling taxonomy: the caller sends
/// an `error` frame back and keeps the connection open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("frame exceeds the size limit ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("action name exceeds the length limit")]
    ActionNameTooLong,
    #[error("unknown compression flag byte {0}")]
    UnknownCompressionFlag(u8),
    #[error("malformed frame json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error during frame (de)compression: {0}")]
    Io(#[from] std::io::Error),
}

/// Frozen error codes surfaced on the HTTP envelope and, where applicable,
/// mirrored in duplex `error` frame text. Treat as append-only: removing or
/// renumbering one is a breaking change for any client matching on it.
pub mod codes {
    pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
    pub const ACTION_NOT_FOUND: &str = "ACTION_NOT_FOUND";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const RENDER_ERROR: &str = "RENDER_ERROR";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}
