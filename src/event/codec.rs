/*!
 * Wire Codec
 * Versioned bincode framing for shipping RawEvents across process boundaries
 */

use super::raw::RawEvent;
use crate::core::errors::CodecError;

/// Format version for forward/backward compatibility
const WIRE_VERSION: u8 = 1;

/// Encode an event into a versioned frame
///
/// Frame layout: one version byte followed by the bincode body.
pub fn encode(event: &RawEvent) -> Result<Vec<u8>, CodecError> {
    let body =
        bincode::serialize(event).map_err(|e| CodecError::Encode(e.to_string().into()))?;
    let mut frame = Vec::with_capacity(1 + body.len());
    frame.push(WIRE_VERSION);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a versioned frame back into an event
///
/// Rejects frames from incompatible library versions rather than guessing
/// at the layout.
pub fn decode(frame: &[u8]) -> Result<RawEvent, CodecError> {
    let (&version, body) = frame
        .split_first()
        .ok_or(CodecError::TruncatedFrame(frame.len()))?;

    if version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    bincode::deserialize(body).map_err(|e| CodecError::Decode(e.to_string().into()))
}
