//! Length-prefixing is the transport's job (the duplex transport is an
//! opaque collaborator per spec); this module only handles the payload that
//! goes inside each length-delimited message: a one-byte compression flag
//! followed by JSON, optionally gzipped.
//!
//! Grounded on `clockworklabs-SpacetimeDB`'s
//! `subscription/websocket_building.rs::gzip_compress` (`flate2::write::GzEncoder`,
//! `Compression::fast()`), the only gzip-over-the-wire precedent in the pack.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ProtocolError;
use crate::frame::{Frame, MAX_FRAME_BYTES};

const FLAG_UNCOMPRESSED: u8 = 0;
const FLAG_GZIP: u8 = 1;

/// Encodes `frame`, gzipping the JSON body when `compress` is set. The
/// returned bytes are the payload the transport frames with its own length
/// prefix.
pub fn encode(frame: &Frame, compress: bool) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(frame)?;
    let mut out = Vec::with_capacity(json.len() + 1);
    if compress {
        out.push(FLAG_GZIP);
        let mut encoder = GzEncoder::new(&mut out, Compression::fast());
        encoder.write_all(&json)?;
        encoder.finish()?;
    } else {
        out.push(FLAG_UNCOMPRESSED);
        out.extend_from_slice(&json);
    }
    Ok(out)
}

/// Decodes a payload produced by `encode`. Rejects frames whose decoded JSON
/// exceeds [`MAX_FRAME_BYTES`] and runs [`Frame::validate`] before handing
/// the frame back, so callers never see an oversize action name.
pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    let (flag, rest) = bytes.split_first().ok_or(ProtocolError::Empty)?;
    let json = match *flag {
        FLAG_UNCOMPRESSED => rest.to_vec(),
        FLAG_GZIP => {
            let mut decoder = GzDecoder::new(rest);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        }
        other => return Err(ProtocolError::UnknownCompressionFlag(other)),
    };
    if json.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(json.len()));
    }
    let frame: Frame = serde_json::from_slice(&json)?;
    frame.validate()?;
    Ok(frame)
}
