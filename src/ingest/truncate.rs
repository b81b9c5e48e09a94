/*!
 * Payload Truncation
 * Size-bounds payload strings before they enter the ring
 */

use crate::config::TruncationLimits;
use crate::core::types::InlineString;
use crate::event::Payload;

/// Clip a string to `max` bytes on a char boundary
///
/// Returns true when data was cut.
fn clip(s: &mut InlineString, max: usize) -> bool {
    if s.len() <= max {
        return false;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
    true
}

/// Bound every string in the payload, setting its truncation marker when cut
///
/// Message payloads carry only fixed-width fields and pass through untouched.
pub fn bound(mut payload: Payload, limits: &TruncationLimits) -> Payload {
    let max = limits.max_string_bytes;
    match &mut payload {
        Payload::CallEntry {
            function,
            args_preview,
            truncated,
        } => {
            let cut = clip(function, max) | clip(args_preview, max);
            *truncated |= cut;
        }
        Payload::CallExit {
            function,
            return_preview,
            truncated,
        } => {
            let cut = clip(function, max) | clip(return_preview, max);
            *truncated |= cut;
        }
        Payload::StateChange {
            subject,
            from,
            to,
            truncated,
        } => {
            let cut = clip(subject, max) | clip(from, max) | clip(to, max);
            *truncated |= cut;
        }
        Payload::ProcessSpawn { name, .. } => {
            let _ = clip(name, max);
        }
        Payload::Error { message, truncated } => {
            *truncated |= clip(message, max);
        }
        Payload::MessageSend { .. } | Payload::MessageReceive { .. } | Payload::ProcessExit { .. } => {}
    }
    payload
}
