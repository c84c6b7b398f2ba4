//! Wire types for the duplex reactive-state protocol: the `Frame` enum,
//! frozen error codes, the gzip-optional codec, and the HTTP error envelope
//! shared by the framework's administrative HTTP surface.

mod codec;
mod error;
mod frame;
mod http;

pub use codec::{decode, encode};
pub use error::{codes as error_codes, ProtocolError};
pub use frame::{Frame, MAX_ACTION_NAME_BYTES, MAX_FRAME_BYTES};
pub use http::HttpErrorEnvelope;
