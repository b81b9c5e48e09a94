/*!
 * Raw Events
 * Strongly-typed capture events written by instrumentation
 */

use crate::core::types::{InlineString, ProducerId};
use serde::{Deserialize, Serialize};

/// Event kind tag for fast dispatch without matching the full payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventKind {
    CallEntry,
    CallExit,
    MessageSend,
    MessageReceive,
    StateChange,
    ProcessSpawn,
    ProcessExit,
    Error,
}

/// Kind-specific bounded payload
///
/// Strings are truncated at ingest to a configured maximum; the `truncated`
/// flag tells downstream consumers data was cut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    CallEntry {
        function: InlineString,
        args_preview: InlineString,
        truncated: bool,
    },
    CallExit {
        function: InlineString,
        return_preview: InlineString,
        truncated: bool,
    },
    MessageSend {
        recipient: ProducerId,
        fingerprint: u64,
        bytes: usize,
    },
    MessageReceive {
        sender: ProducerId,
        fingerprint: u64,
        bytes: usize,
    },
    StateChange {
        subject: InlineString,
        from: InlineString,
        to: InlineString,
        truncated: bool,
    },
    ProcessSpawn {
        child: ProducerId,
        name: InlineString,
    },
    ProcessExit {
        exit_code: Option<i32>,
    },
    Error {
        message: InlineString,
        truncated: bool,
    },
}

impl Payload {
    /// Kind tag for this payload
    #[inline]
    pub fn kind(&self) -> EventKind {
        match self {
            Payload::CallEntry { .. } => EventKind::CallEntry,
            Payload::CallExit { .. } => EventKind::CallExit,
            Payload::MessageSend { .. } => EventKind::MessageSend,
            Payload::MessageReceive { .. } => EventKind::MessageReceive,
            Payload::StateChange { .. } => EventKind::StateChange,
            Payload::ProcessSpawn { .. } => EventKind::ProcessSpawn,
            Payload::ProcessExit { .. } => EventKind::ProcessExit,
            Payload::Error { .. } => EventKind::Error,
        }
    }
}

/// The unit written by instrumentation
///
/// Immutable once written: buffers hand out `Arc<RawEvent>` and correlation
/// attaches additional records rather than editing the original.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event kind tag
    pub kind: EventKind,
    /// Logical execution unit that emitted the event
    pub producer: ProducerId,
    /// Kind-specific bounded data
    pub payload: Payload,
    /// Wall-clock capture time (microseconds since epoch) - display only
    pub wall_time_us: u64,
    /// Monotonic capture time (nanoseconds) - authoritative per-producer order
    pub monotonic_ns: u64,
    /// Position claimed at write time; unique per slot claim, gaps in the
    /// sequence tell a consumer how many events were dropped
    pub sequence: u64,
}

impl RawEvent {
    /// Build an event stamped with the current clocks; `sequence` is assigned
    /// by the ring at write time
    #[inline]
    pub fn new(producer: ProducerId, payload: Payload) -> Self {
        Self {
            kind: payload.kind(),
            producer,
            payload,
            wall_time_us: crate::core::types::wall_time_us(),
            monotonic_ns: crate::core::types::monotonic_ns(),
            sequence: 0,
        }
    }
}
