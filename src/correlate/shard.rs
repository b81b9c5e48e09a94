/*!
 * Correlator Shards
 * Parallel correlation tasks with causality-preserving routing
 *
 * Each shard exclusively owns its slice of call stacks and pending
 * messages. Routing keeps causal counterparts together: message events hash
 * the communicating pair so both ends of a transit land on the same shard;
 * everything else hashes the producer so call stacks stay shard-local.
 */

use super::correlator::{Correlator, CorrelatorCounters};
use crate::config::SharedConfig;
use crate::core::errors::PoolError;
use crate::core::id::CorrelationIdGenerator;
use crate::core::types::{monotonic_ns, ProducerId};
use crate::event::{EnrichedEvent, Payload};
use crate::pressure::LatencyTracker;
use crate::sink::StorageSink;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Routes enriched batches to their shard's bounded channel
///
/// Cloned into every worker. A slow shard backpressures here, suspending the
/// worker, never the producers.
#[derive(Clone)]
pub struct CorrelatorRouter {
    senders: Vec<mpsc::Sender<Vec<EnrichedEvent>>>,
    mask: u64,
    hasher: ahash::RandomState,
}

impl CorrelatorRouter {
    /// Dispatch a batch, splitting it per shard when more than one runs
    pub async fn dispatch(&self, batch: Vec<EnrichedEvent>) -> Result<(), PoolError> {
        if batch.is_empty() {
            return Ok(());
        }

        if self.senders.len() == 1 {
            return self.senders[0]
                .send(batch)
                .await
                .map_err(|_| PoolError::ShuttingDown);
        }

        let mut per_shard: Vec<Vec<EnrichedEvent>> = vec![Vec::new(); self.senders.len()];
        for event in batch {
            per_shard[self.route(&event)].push(event);
        }

        for (shard, events) in per_shard.into_iter().enumerate() {
            if !events.is_empty() {
                self.senders[shard]
                    .send(events)
                    .await
                    .map_err(|_| PoolError::ShuttingDown)?;
            }
        }
        Ok(())
    }

    /// Shard index for one event
    fn route(&self, event: &EnrichedEvent) -> usize {
        let hash = match &event.event.payload {
            Payload::MessageSend { recipient, .. } => self.hash_pair(event.producer(), *recipient),
            Payload::MessageReceive { sender, .. } => self.hash_pair(*sender, event.producer()),
            _ => self.hasher.hash_one(event.producer()),
        };
        (hash & self.mask) as usize
    }

    #[inline]
    fn hash_pair(&self, sender: ProducerId, recipient: ProducerId) -> u64 {
        self.hasher.hash_one((sender, recipient))
    }

    #[cfg(test)]
    pub(crate) fn route_for_test(&self, event: &EnrichedEvent) -> usize {
        self.route(event)
    }
}

/// The set of running shard tasks
pub struct ShardedCorrelator;

impl ShardedCorrelator {
    /// Spawn `shards` correlation tasks and return the router feeding them
    ///
    /// Shard tasks exit when every router clone has been dropped, flushing
    /// whatever their channels still hold on the way out.
    pub fn start(
        config: SharedConfig,
        ids: CorrelationIdGenerator,
        sink: Arc<dyn StorageSink>,
        counters: Arc<CorrelatorCounters>,
        latency: Arc<LatencyTracker>,
    ) -> (CorrelatorRouter, Vec<JoinHandle<()>>) {
        let snapshot = config.load();
        let shards = snapshot.correlator_shards;
        debug_assert!(shards.is_power_of_two());

        let mut senders = Vec::with_capacity(shards);
        let mut handles = Vec::with_capacity(shards);

        for shard in 0..shards {
            let (tx, rx) = mpsc::channel(snapshot.channel_depth);
            senders.push(tx);

            let task = ShardTask {
                shard,
                rx,
                correlator: Correlator::new(ids.clone(), config.clone(), Arc::clone(&counters)),
                sink: Arc::clone(&sink),
                counters: Arc::clone(&counters),
                latency: Arc::clone(&latency),
                cleanup_interval: snapshot.cleanup_interval,
            };
            handles.push(tokio::spawn(task.run()));
        }

        let router = CorrelatorRouter {
            senders,
            mask: (shards - 1) as u64,
            hasher: ahash::RandomState::new(),
        };
        (router, handles)
    }
}

struct ShardTask {
    shard: usize,
    rx: mpsc::Receiver<Vec<EnrichedEvent>>,
    correlator: Correlator,
    sink: Arc<dyn StorageSink>,
    counters: Arc<CorrelatorCounters>,
    latency: Arc<LatencyTracker>,
    cleanup_interval: std::time::Duration,
}

impl ShardTask {
    async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.cleanup_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                maybe_batch = self.rx.recv() => {
                    match maybe_batch {
                        Some(batch) => self.process(batch),
                        None => {
                            tracing::debug!(shard = self.shard, "correlator shard channel closed, exiting");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    let evicted = self.correlator.cleanup_expired();
                    if evicted > 0 {
                        tracing::trace!(shard = self.shard, evicted, "swept expired correlation state");
                    }
                }
            }
        }
    }

    fn process(&mut self, batch: Vec<EnrichedEvent>) {
        let received_ns = batch
            .iter()
            .map(|e| e.received_at_ns)
            .min()
            .unwrap_or_else(monotonic_ns);

        let correlated = self.correlator.correlate_batch(batch);
        self.latency
            .record(monotonic_ns().saturating_sub(received_ns) / 1_000);

        if let Err(e) = self.sink.write_batch(correlated) {
            // Recorded tradeoff: the batch is dropped, never retried, so a
            // broken backend cannot grow memory without bound.
            self.counters
                .storage_failures
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            tracing::warn!(shard = self.shard, error = %e, "storage sink rejected batch, dropping");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConfig;
    use crate::core::types::WorkerId;
    use crate::event::RawEvent;
    use crate::sink::VecSink;

    fn enriched(producer: u64, payload: Payload) -> EnrichedEvent {
        EnrichedEvent::new(
            Arc::new(RawEvent::new(ProducerId(producer), payload)),
            WorkerId(1),
            0,
        )
    }

    fn start_with_shards(
        shards: usize,
        sink: Arc<dyn StorageSink>,
    ) -> (CorrelatorRouter, Vec<JoinHandle<()>>) {
        let config = SharedConfig::new(CaptureConfig {
            correlator_shards: shards,
            ..Default::default()
        })
        .unwrap();
        ShardedCorrelator::start(
            config,
            CorrelationIdGenerator::new(),
            sink,
            Arc::new(CorrelatorCounters::default()),
            Arc::new(LatencyTracker::new()),
        )
    }

    #[tokio::test]
    async fn test_batch_flows_to_sink() {
        let sink = Arc::new(VecSink::new());
        let (router, handles) = start_with_shards(1, sink.clone());

        router
            .dispatch(vec![enriched(1, Payload::ProcessExit { exit_code: None })])
            .await
            .unwrap();

        drop(router);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_send_and_receive_route_to_same_shard() {
        let sink = Arc::new(VecSink::new());
        let (router, handles) = start_with_shards(4, sink.clone());

        let send = enriched(
            1,
            Payload::MessageSend {
                recipient: ProducerId(2),
                fingerprint: 7,
                bytes: 8,
            },
        );
        let recv = enriched(
            2,
            Payload::MessageReceive {
                sender: ProducerId(1),
                fingerprint: 7,
                bytes: 8,
            },
        );
        assert_eq!(router.route_for_test(&send), router.route_for_test(&recv));

        // And the pair correlates even across shard boundaries of producers
        router.dispatch(vec![send, recv]).await.unwrap();
        drop(router);
        for handle in handles {
            handle.await.unwrap();
        }

        let events = sink.snapshot();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| !e.orphaned));
    }

    #[tokio::test]
    async fn test_sink_failure_counts_and_drops() {
        use crate::core::errors::StorageError;
        use crate::sink::MockStorageSink;

        let mut mock = MockStorageSink::new();
        mock.expect_write_batch()
            .returning(|_| Err(StorageError::Rejected("backend down".into())));

        let config = SharedConfig::new(CaptureConfig::default()).unwrap();
        let counters = Arc::new(CorrelatorCounters::default());
        let (router, handles) = ShardedCorrelator::start(
            config,
            CorrelationIdGenerator::new(),
            Arc::new(mock),
            Arc::clone(&counters),
            Arc::new(LatencyTracker::new()),
        );

        router
            .dispatch(vec![enriched(1, Payload::ProcessExit { exit_code: None })])
            .await
            .unwrap();

        drop(router);
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.storage_failures, 1);
        // The event was still correlated; only the batch hand-off failed
        assert_eq!(snapshot.correlated, 1);
    }

    #[tokio::test]
    async fn test_same_producer_calls_stay_on_one_shard() {
        let sink = Arc::new(VecSink::new());
        let (router, handles) = start_with_shards(8, sink.clone());

        let mut batch = Vec::new();
        for _ in 0..10 {
            batch.push(enriched(
                42,
                Payload::CallEntry {
                    function: "f".into(),
                    args_preview: "".into(),
                    truncated: false,
                },
            ));
        }
        let shard = router.route_for_test(&batch[0]);
        assert!(batch.iter().all(|e| router.route_for_test(e) == shard));

        router.dispatch(batch).await.unwrap();
        drop(router);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(sink.len(), 10);
    }
}
