/*!
 * Correlated Events
 * Terminal data unit handed to storage, linking events into causal chains
 */

use super::enriched::EnrichedEvent;
use crate::core::types::CorrelationId;
use serde::{Deserialize, Serialize};

/// Relation between two correlated events, expressed by id lookup rather
/// than in-memory references so chains stay cycle-free and serializable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkKind {
    /// A call_exit completing its matching call_entry
    Completes,
    /// A message_receive consuming its matching message_send
    Receives,
    /// An event attached to the call invocation it happened inside
    OccurredDuring,
}

/// The terminal data unit handed to the storage boundary
///
/// Every `EnrichedEvent` yields exactly one of these; correlation failure
/// marks the event orphaned (confidence 0.0, no parent) instead of dropping it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatedEvent {
    /// The enriched event this record describes
    pub event: EnrichedEvent,
    /// Causal unit this event belongs to
    pub correlation_id: CorrelationId,
    /// Causally preceding unit, if any
    pub parent: Option<CorrelationId>,
    /// First unit in this causal chain
    pub root: CorrelationId,
    /// Additional causal relations
    pub links: Vec<(LinkKind, CorrelationId)>,
    /// 1.0 for exact matches, lowered for heuristic inference, 0.0 for orphans
    pub confidence: f32,
    /// Set when no causal counterpart was found within the time window
    pub orphaned: bool,
}

impl CorrelatedEvent {
    /// A fully-matched event in an existing chain
    pub fn matched(
        event: EnrichedEvent,
        correlation_id: CorrelationId,
        parent: Option<CorrelationId>,
        root: CorrelationId,
        confidence: f32,
    ) -> Self {
        Self {
            event,
            correlation_id,
            parent,
            root,
            links: Vec::new(),
            confidence,
            orphaned: false,
        }
    }

    /// A fresh root: first event of a new causal chain
    pub fn root(event: EnrichedEvent, correlation_id: CorrelationId) -> Self {
        Self {
            event,
            correlation_id,
            parent: None,
            root: correlation_id,
            links: Vec::new(),
            confidence: 1.0,
            orphaned: false,
        }
    }

    /// An event whose causal counterpart could not be found in time
    pub fn orphan(event: EnrichedEvent, correlation_id: CorrelationId) -> Self {
        Self {
            event,
            correlation_id,
            parent: None,
            root: correlation_id,
            links: Vec::new(),
            confidence: 0.0,
            orphaned: true,
        }
    }

    /// Attach a causal relation
    #[inline]
    pub fn with_link(mut self, kind: LinkKind, target: CorrelationId) -> Self {
        self.links.push((kind, target));
        self
    }

    /// Whether this event carries the given link
    pub fn has_link(&self, kind: LinkKind, target: CorrelationId) -> bool {
        self.links.iter().any(|&(k, t)| k == kind && t == target)
    }
}
