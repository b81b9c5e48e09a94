/*!
 * Ingestor
 * The hot-path write API called by instrumentation
 *
 * Fire-and-forget: nothing on this path returns an error to the caller or
 * panics, because instrumentation must never destabilize the host program.
 * Internal failures are counted, not propagated.
 */

use super::shed::ShedGate;
use super::truncate;
use crate::buffer::EventRing;
use crate::config::TruncationLimits;
use crate::core::types::{InlineString, ProducerId};
use crate::event::{Payload, RawEvent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Ingest-side counters
#[derive(Debug, Default)]
pub struct IngestCounters {
    pub ingested: AtomicU64,
    pub shed: AtomicU64,
    pub failed: AtomicU64,
    pub disabled: AtomicU64,
}

/// Point-in-time ingest statistics
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IngestStats {
    pub ingested: u64,
    pub shed: u64,
    pub failed: u64,
    pub disabled: u64,
}

/// The narrow call surface instrumentation depends on
///
/// Cloning is cheap (a handful of `Arc`s); instrumented call sites each hold
/// their own clone. The enabled flag is injected rather than process-global
/// so tests run against isolated instances.
#[derive(Clone)]
pub struct Ingestor {
    ring: Arc<EventRing>,
    enabled: Arc<AtomicBool>,
    shed: Arc<ShedGate>,
    limits: TruncationLimits,
    counters: Arc<IngestCounters>,
}

impl Ingestor {
    pub fn new(
        ring: Arc<EventRing>,
        enabled: Arc<AtomicBool>,
        shed: Arc<ShedGate>,
        limits: TruncationLimits,
    ) -> Self {
        Self {
            ring,
            enabled,
            shed,
            limits,
            counters: Arc::new(IngestCounters::default()),
        }
    }

    /// Write one event (fire-and-forget)
    ///
    /// The only work before the buffer write is the enabled check, the shed
    /// decision, truncation, and timestamping.
    #[inline]
    pub fn write_event(&self, producer: ProducerId, payload: Payload) {
        if !self.enabled.load(Ordering::Relaxed) {
            self.counters.disabled.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if self.shed.should_shed() {
            self.counters.shed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let payload = truncate::bound(payload, &self.limits);
        let event = RawEvent::new(producer, payload);

        match self.ring.write(event) {
            Ok(_) => {
                self.counters.ingested.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                // Full under reject policy, or destroyed mid-shutdown.
                // Counted, never surfaced to the instrumented program.
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            ingested: self.counters.ingested.load(Ordering::Relaxed),
            shed: self.counters.shed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            disabled: self.counters.disabled.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Convenience wrappers for common instrumentation call sites
impl Ingestor {
    pub fn call_entry(
        &self,
        producer: ProducerId,
        function: impl Into<InlineString>,
        args_preview: impl Into<InlineString>,
    ) {
        self.write_event(
            producer,
            Payload::CallEntry {
                function: function.into(),
                args_preview: args_preview.into(),
                truncated: false,
            },
        );
    }

    pub fn call_exit(
        &self,
        producer: ProducerId,
        function: impl Into<InlineString>,
        return_preview: impl Into<InlineString>,
    ) {
        self.write_event(
            producer,
            Payload::CallExit {
                function: function.into(),
                return_preview: return_preview.into(),
                truncated: false,
            },
        );
    }

    pub fn message_send(
        &self,
        producer: ProducerId,
        recipient: ProducerId,
        fingerprint: u64,
        bytes: usize,
    ) {
        self.write_event(
            producer,
            Payload::MessageSend {
                recipient,
                fingerprint,
                bytes,
            },
        );
    }

    pub fn message_receive(
        &self,
        producer: ProducerId,
        sender: ProducerId,
        fingerprint: u64,
        bytes: usize,
    ) {
        self.write_event(
            producer,
            Payload::MessageReceive {
                sender,
                fingerprint,
                bytes,
            },
        );
    }

    pub fn state_change(
        &self,
        producer: ProducerId,
        subject: impl Into<InlineString>,
        from: impl Into<InlineString>,
        to: impl Into<InlineString>,
    ) {
        self.write_event(
            producer,
            Payload::StateChange {
                subject: subject.into(),
                from: from.into(),
                to: to.into(),
                truncated: false,
            },
        );
    }

    pub fn process_spawn(&self, producer: ProducerId, child: ProducerId, name: impl Into<InlineString>) {
        self.write_event(
            producer,
            Payload::ProcessSpawn {
                child,
                name: name.into(),
            },
        );
    }

    pub fn process_exit(&self, producer: ProducerId, exit_code: Option<i32>) {
        self.write_event(producer, Payload::ProcessExit { exit_code });
    }

    pub fn error(&self, producer: ProducerId, message: impl Into<InlineString>) {
        self.write_event(
            producer,
            Payload::Error {
                message: message.into(),
                truncated: false,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OverflowPolicy;
    use crate::core::types::BufferId;

    fn ingestor(capacity: usize, policy: OverflowPolicy) -> (Ingestor, Arc<EventRing>) {
        let ring = Arc::new(EventRing::new(BufferId(0), capacity, policy));
        let ing = Ingestor::new(
            Arc::clone(&ring),
            Arc::new(AtomicBool::new(true)),
            ShedGate::new(100),
            TruncationLimits::default(),
        );
        (ing, ring)
    }

    #[test]
    fn test_write_lands_in_ring() {
        let (ing, ring) = ingestor(16, OverflowPolicy::DropOldest);
        ing.call_entry(ProducerId(1), "main", "");

        let cursor = ring.cursor();
        let event = ring.read(&cursor).unwrap().unwrap();
        assert_eq!(event.producer, ProducerId(1));
        assert_eq!(ing.stats().ingested, 1);
    }

    #[test]
    fn test_disabled_is_a_noop() {
        let ring = Arc::new(EventRing::new(BufferId(0), 16, OverflowPolicy::DropOldest));
        let enabled = Arc::new(AtomicBool::new(false));
        let ing = Ingestor::new(
            Arc::clone(&ring),
            Arc::clone(&enabled),
            ShedGate::new(100),
            TruncationLimits::default(),
        );

        ing.error(ProducerId(1), "ignored");
        assert_eq!(ing.stats().ingested, 0);
        assert_eq!(ing.stats().disabled, 1);

        enabled.store(true, Ordering::Relaxed);
        ing.error(ProducerId(1), "captured");
        assert_eq!(ing.stats().ingested, 1);
    }

    #[test]
    fn test_full_reject_never_errors_the_caller() {
        let (ing, _ring) = ingestor(4, OverflowPolicy::Reject);
        for i in 0..10 {
            ing.process_exit(ProducerId(i), None);
        }
        let stats = ing.stats();
        assert_eq!(stats.ingested, 4);
        assert_eq!(stats.failed, 6);
    }

    #[test]
    fn test_shed_gate_applies_before_write() {
        let ring = Arc::new(EventRing::new(BufferId(0), 64, OverflowPolicy::DropOldest));
        let gate = ShedGate::new(0);
        gate.set_active(true);
        let ing = Ingestor::new(
            Arc::clone(&ring),
            Arc::new(AtomicBool::new(true)),
            gate,
            TruncationLimits::default(),
        );

        for _ in 0..50 {
            ing.error(ProducerId(1), "shed me");
        }
        assert_eq!(ing.stats().shed, 50);
        assert_eq!(ring.stats().written, 0);
    }

    #[test]
    fn test_oversized_payload_truncated_at_ingest() {
        let ring = Arc::new(EventRing::new(BufferId(0), 16, OverflowPolicy::DropOldest));
        let ing = Ingestor::new(
            Arc::clone(&ring),
            Arc::new(AtomicBool::new(true)),
            ShedGate::new(100),
            TruncationLimits {
                max_string_bytes: 8,
            },
        );

        ing.error(ProducerId(1), "a very long error message");

        let cursor = ring.cursor();
        let event = ring.read(&cursor).unwrap().unwrap();
        match &event.payload {
            Payload::Error { message, truncated } => {
                assert_eq!(message.len(), 8);
                assert!(truncated);
            }
            other => unreachable!("unexpected payload {other:?}"),
        }
    }
}
