/*!
 * Correlation State
 * Transient per-shard tables: call stacks and pending messages
 *
 * Exclusively owned by one correlator shard; never shared. Memory is
 * bounded by the TTL sweep, not by garbage collection of dead keys.
 */

use crate::core::types::{CorrelationId, ProducerId};
use ahash::AHashMap;
use std::collections::VecDeque;

/// One open call invocation on a producer's stack
#[derive(Debug, Clone, Copy)]
pub struct StackEntry {
    pub id: CorrelationId,
    pub root: CorrelationId,
    pub entered_ns: u64,
}

/// One unconsumed message send awaiting its receive
#[derive(Debug, Clone, Copy)]
pub struct PendingSend {
    pub id: CorrelationId,
    pub sent_ns: u64,
}

/// Identity of a message transit: who sent, to whom, and what
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageSignature {
    pub sender: ProducerId,
    pub recipient: ProducerId,
    pub fingerprint: u64,
}

/// Mutable correlation tables for one shard
#[derive(Debug, Default)]
pub struct CorrelationState {
    /// Strict LIFO of open calls per producer
    call_stacks: AHashMap<ProducerId, Vec<StackEntry>>,
    /// Unconsumed sends per signature, FIFO by send time
    pending_messages: AHashMap<MessageSignature, VecDeque<PendingSend>>,
}

impl CorrelationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current innermost open call, if any
    #[inline]
    pub fn stack_top(&self, producer: ProducerId) -> Option<&StackEntry> {
        self.call_stacks.get(&producer).and_then(|s| s.last())
    }

    pub fn push_call(&mut self, producer: ProducerId, entry: StackEntry) {
        self.call_stacks.entry(producer).or_default().push(entry);
    }

    /// Pop the innermost open call; `None` signals an unmatched exit
    pub fn pop_call(&mut self, producer: ProducerId) -> Option<StackEntry> {
        let stack = self.call_stacks.get_mut(&producer)?;
        let entry = stack.pop();
        if stack.is_empty() {
            self.call_stacks.remove(&producer);
        }
        entry
    }

    pub fn register_send(&mut self, signature: MessageSignature, send: PendingSend) {
        self.pending_messages
            .entry(signature)
            .or_default()
            .push_back(send);
    }

    /// Consume the most plausible matching send within the TTL window
    ///
    /// Expired entries at the front are discarded on the way. When several
    /// live candidates exist, the earliest unconsumed send wins (FIFO
    /// tie-break) and the match is flagged ambiguous so the caller can lower
    /// confidence.
    pub fn match_receive(
        &mut self,
        signature: &MessageSignature,
        received_ns: u64,
        ttl_ns: u64,
    ) -> Option<(PendingSend, bool)> {
        let pending = self.pending_messages.get_mut(signature)?;

        while let Some(front) = pending.front() {
            if received_ns.saturating_sub(front.sent_ns) > ttl_ns {
                pending.pop_front();
            } else {
                break;
            }
        }

        let ambiguous = pending.len() > 1;
        let matched = pending.pop_front();
        if pending.is_empty() {
            self.pending_messages.remove(signature);
        }
        matched.map(|send| (send, ambiguous))
    }

    /// Evict all entries older than the TTL, returning how many were removed
    ///
    /// Eviction only bounds memory; events already emitted against these
    /// entries are never revised.
    pub fn sweep(&mut self, now_ns: u64, ttl_ns: u64) -> usize {
        let mut evicted = 0;

        self.call_stacks.retain(|_, stack| {
            let before = stack.len();
            stack.retain(|entry| now_ns.saturating_sub(entry.entered_ns) <= ttl_ns);
            evicted += before - stack.len();
            !stack.is_empty()
        });

        self.pending_messages.retain(|_, pending| {
            while let Some(front) = pending.front() {
                if now_ns.saturating_sub(front.sent_ns) > ttl_ns {
                    pending.pop_front();
                    evicted += 1;
                } else {
                    break;
                }
            }
            !pending.is_empty()
        });

        evicted
    }

    pub fn open_calls(&self) -> usize {
        self.call_stacks.values().map(Vec::len).sum()
    }

    pub fn pending_sends(&self) -> usize {
        self.pending_messages.values().map(VecDeque::len).sum()
    }
}
