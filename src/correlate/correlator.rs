/*!
 * Event Correlator
 * Reconstructs causal links from an unordered, lossy event stream
 *
 * Pure function of a batch plus the shard's mutable state. No await points:
 * a cancelled shard task can never leave the tables half-updated, so batch
 * correlation is all-or-nothing.
 */

use super::state::{CorrelationState, MessageSignature, PendingSend, StackEntry};
use crate::config::SharedConfig;
use crate::core::id::CorrelationIdGenerator;
use crate::core::limits::HEURISTIC_MATCH_CONFIDENCE;
use crate::core::types::{monotonic_ns, ProducerId};
use crate::event::{CorrelatedEvent, EnrichedEvent, LinkKind, Payload};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared correlation counters (one instance across all shards)
#[derive(Debug, Default)]
pub struct CorrelatorCounters {
    pub correlated: AtomicU64,
    pub orphaned: AtomicU64,
    pub evicted: AtomicU64,
    pub batches: AtomicU64,
    pub storage_failures: AtomicU64,
}

/// Point-in-time correlation statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CorrelationSnapshot {
    pub correlated: u64,
    pub orphaned: u64,
    pub evicted: u64,
    pub batches: u64,
    pub storage_failures: u64,
    /// correlated / (correlated + orphaned), 1.0 when nothing processed
    pub success_rate: f64,
}

impl CorrelatorCounters {
    pub fn snapshot(&self) -> CorrelationSnapshot {
        let correlated = self.correlated.load(Ordering::Relaxed);
        let orphaned = self.orphaned.load(Ordering::Relaxed);
        let processed = correlated + orphaned;
        CorrelationSnapshot {
            correlated,
            orphaned,
            evicted: self.evicted.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            success_rate: if processed == 0 {
                1.0
            } else {
                correlated as f64 / processed as f64
            },
        }
    }
}

/// Pre-extracted routing fields so the enriched event can move into the output
enum Action {
    Entry,
    Exit,
    Send {
        recipient: ProducerId,
        fingerprint: u64,
    },
    Receive {
        sender: ProducerId,
        fingerprint: u64,
    },
    Other,
}

/// One correlation engine (one shard's worth of state)
pub struct Correlator {
    state: CorrelationState,
    ids: CorrelationIdGenerator,
    config: SharedConfig,
    counters: Arc<CorrelatorCounters>,
}

impl Correlator {
    pub fn new(
        ids: CorrelationIdGenerator,
        config: SharedConfig,
        counters: Arc<CorrelatorCounters>,
    ) -> Self {
        Self {
            state: CorrelationState::new(),
            ids,
            config,
            counters,
        }
    }

    /// Correlate a batch in arrival order, emitting exactly one
    /// `CorrelatedEvent` per input event
    pub fn correlate_batch(&mut self, batch: Vec<EnrichedEvent>) -> Vec<CorrelatedEvent> {
        let ttl_ns = self.config.load().correlation_ttl.as_nanos() as u64;
        let mut out = Vec::with_capacity(batch.len());

        for enriched in batch {
            out.push(self.correlate_one(enriched, ttl_ns));
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        out
    }

    fn correlate_one(&mut self, enriched: EnrichedEvent, ttl_ns: u64) -> CorrelatedEvent {
        let producer = enriched.producer();
        let event_ns = enriched.event.monotonic_ns;

        // Copy the routing fields out before `enriched` moves into the output
        let action = match &enriched.event.payload {
            Payload::CallEntry { .. } => Action::Entry,
            Payload::CallExit { .. } => Action::Exit,
            Payload::MessageSend {
                recipient,
                fingerprint,
                ..
            } => Action::Send {
                recipient: *recipient,
                fingerprint: *fingerprint,
            },
            Payload::MessageReceive {
                sender,
                fingerprint,
                ..
            } => Action::Receive {
                sender: *sender,
                fingerprint: *fingerprint,
            },
            Payload::StateChange { .. }
            | Payload::ProcessSpawn { .. }
            | Payload::ProcessExit { .. }
            | Payload::Error { .. } => Action::Other,
        };

        match action {
            Action::Entry => {
                let id = self.ids.next();
                let (parent, root) = match self.state.stack_top(producer) {
                    Some(top) => (Some(top.id), top.root),
                    None => (None, id),
                };
                self.state.push_call(
                    producer,
                    StackEntry {
                        id,
                        root,
                        entered_ns: event_ns,
                    },
                );
                self.matched(CorrelatedEvent::matched(enriched, id, parent, root, 1.0))
            }

            Action::Exit => match self.state.pop_call(producer) {
                Some(entry) => {
                    // The exit shares the invocation's id; its parent is
                    // whatever call is still open underneath.
                    let parent = self.state.stack_top(producer).map(|top| top.id);
                    self.matched(
                        CorrelatedEvent::matched(enriched, entry.id, parent, entry.root, 1.0)
                            .with_link(LinkKind::Completes, entry.id),
                    )
                }
                None => self.orphan(enriched),
            },

            Action::Send {
                recipient,
                fingerprint,
            } => {
                let id = self.ids.next();
                self.state.register_send(
                    MessageSignature {
                        sender: producer,
                        recipient,
                        fingerprint,
                    },
                    PendingSend {
                        id,
                        sent_ns: event_ns,
                    },
                );
                self.matched(CorrelatedEvent::root(enriched, id))
            }

            Action::Receive {
                sender,
                fingerprint,
            } => {
                let signature = MessageSignature {
                    sender,
                    recipient: producer,
                    fingerprint,
                };
                match self.state.match_receive(&signature, event_ns, ttl_ns) {
                    Some((send, ambiguous)) => {
                        let id = self.ids.next();
                        let confidence = if ambiguous {
                            HEURISTIC_MATCH_CONFIDENCE
                        } else {
                            1.0
                        };
                        self.matched(
                            CorrelatedEvent::matched(
                                enriched,
                                id,
                                Some(send.id),
                                send.id,
                                confidence,
                            )
                            .with_link(LinkKind::Receives, send.id),
                        )
                    }
                    None => self.orphan(enriched),
                }
            }

            Action::Other => {
                let id = self.ids.next();
                match self.state.stack_top(producer) {
                    Some(top) => {
                        let (parent, root, call) = (Some(top.id), top.root, top.id);
                        self.matched(
                            CorrelatedEvent::matched(enriched, id, parent, root, 1.0)
                                .with_link(LinkKind::OccurredDuring, call),
                        )
                    }
                    // No open call: a fresh root, not an orphan
                    None => self.matched(CorrelatedEvent::root(enriched, id)),
                }
            }
        }
    }

    /// Evict correlation state older than the TTL
    pub fn cleanup_expired(&mut self) -> usize {
        let ttl_ns = self.config.load().correlation_ttl.as_nanos() as u64;
        let evicted = self.state.sweep(monotonic_ns(), ttl_ns);
        if evicted > 0 {
            self.counters
                .evicted
                .fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    pub fn open_calls(&self) -> usize {
        self.state.open_calls()
    }

    pub fn pending_sends(&self) -> usize {
        self.state.pending_sends()
    }

    #[inline]
    fn matched(&self, event: CorrelatedEvent) -> CorrelatedEvent {
        self.counters.correlated.fetch_add(1, Ordering::Relaxed);
        event
    }

    #[inline]
    fn orphan(&mut self, enriched: EnrichedEvent) -> CorrelatedEvent {
        self.counters.orphaned.fetch_add(1, Ordering::Relaxed);
        CorrelatedEvent::orphan(enriched, self.ids.next())
    }
}
