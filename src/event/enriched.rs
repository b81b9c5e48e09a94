/*!
 * Enriched Events
 * RawEvent plus pipeline metadata added by the draining worker
 */

use super::raw::{EventKind, RawEvent};
use crate::core::types::{ProducerId, WorkerId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// RawEvent plus drain-time metadata
///
/// Created by a worker when draining a batch; consumed and discarded after
/// correlation. Only the resulting `CorrelatedEvent` is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedEvent {
    /// The captured event (shared with the ring slot until overwritten)
    pub event: Arc<RawEvent>,
    /// Monotonic time the worker pulled the event out of the ring
    pub received_at_ns: u64,
    /// Worker that drained the event
    pub worker: WorkerId,
    /// Per-worker batch counter the event arrived in
    pub batch_sequence: u64,
}

impl EnrichedEvent {
    #[inline]
    pub fn new(event: Arc<RawEvent>, worker: WorkerId, batch_sequence: u64) -> Self {
        Self {
            event,
            received_at_ns: crate::core::types::monotonic_ns(),
            worker,
            batch_sequence,
        }
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.event.kind
    }

    #[inline]
    pub fn producer(&self) -> ProducerId {
        self.event.producer
    }
}
