/*!
 * Pipeline
 * Assembles buffers, ingestors, workers, correlator shards, and the
 * backpressure controller into one running capture pipeline
 */

mod stats;

pub use stats::PipelineStats;

use crate::buffer::EventRing;
use crate::config::{CaptureConfig, SharedConfig};
use crate::core::id::CorrelationIdGenerator;
use crate::core::types::{BufferId, CaptureResult};
use crate::correlate::{CorrelatorCounters, ShardedCorrelator};
use crate::ingest::{Ingestor, ShedGate};
use crate::pool::{PoolHandle, WorkerPool};
use crate::pressure::{memory, BackpressureController, ControllerHandle, LatencyTracker};
use crate::sink::StorageSink;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// How long shutdown waits for the rings to drain before stopping workers
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A running capture pipeline
///
/// Instrumented call sites hold `Ingestor` clones from `ingestor()`; the
/// pipeline owns everything downstream of the rings.
pub struct Pipeline {
    config: SharedConfig,
    enabled: Arc<AtomicBool>,
    shed: Arc<ShedGate>,
    buffers: Vec<Arc<EventRing>>,
    /// One ingestor (and one set of ingest counters) per buffer, lazily built
    ingestors: DashMap<u32, Ingestor>,
    pool: Option<PoolHandle>,
    controller: Option<ControllerHandle>,
    correlation: Arc<CorrelatorCounters>,
    latency: Arc<LatencyTracker>,
    shard_handles: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl Pipeline {
    /// Validate the config, build the rings, and spawn every background task
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: CaptureConfig, sink: Arc<dyn StorageSink>) -> CaptureResult<Self> {
        let config = SharedConfig::new(config).map_err(crate::core::errors::CaptureError::from)?;
        let snapshot = config.load();

        tracing::info!(
            buffers = snapshot.buffer_count,
            capacity = snapshot.buffer_capacity,
            shards = snapshot.correlator_shards,
            workers = snapshot.workers_target,
            "starting capture pipeline"
        );

        let buffers: Vec<Arc<EventRing>> = (0..snapshot.buffer_count)
            .map(|i| {
                Arc::new(EventRing::new(
                    BufferId(i as u32),
                    snapshot.buffer_capacity,
                    snapshot.overflow_policy,
                ))
            })
            .collect();

        let latency = Arc::new(LatencyTracker::new());
        let correlation = Arc::new(CorrelatorCounters::default());

        let (router, shard_handles) = ShardedCorrelator::start(
            config.clone(),
            CorrelationIdGenerator::new(),
            sink,
            Arc::clone(&correlation),
            Arc::clone(&latency),
        );

        let pool = WorkerPool::start(&buffers, config.clone(), router);

        let shed = ShedGate::new(snapshot.shed_keep_pct);
        let controller = BackpressureController::new(
            buffers.clone(),
            Arc::clone(&latency),
            Arc::clone(&shed),
            config.clone(),
        )
        .spawn(pool.commands());

        Ok(Self {
            config,
            enabled: Arc::new(AtomicBool::new(true)),
            shed,
            buffers,
            ingestors: DashMap::new(),
            pool: Some(pool),
            controller: Some(controller),
            correlation,
            latency,
            shard_handles,
            started_at: Instant::now(),
        })
    }

    /// Ingestor bound to the given buffer (wraps around past the end)
    ///
    /// Repeated calls for the same buffer share one set of counters.
    pub fn ingestor(&self, buffer: usize) -> Ingestor {
        let index = (buffer % self.buffers.len()) as u32;
        self.ingestors
            .entry(index)
            .or_insert_with(|| {
                Ingestor::new(
                    Arc::clone(&self.buffers[index as usize]),
                    Arc::clone(&self.enabled),
                    Arc::clone(&self.shed),
                    self.config.load().truncation,
                )
            })
            .clone()
    }

    /// Flip the capture-wide enabled flag (a disabled ingestor is a no-op)
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Live configuration handle for hot updates
    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    /// Manually adjust the worker count (clamped to configured bounds)
    pub fn scale_workers(&self, workers: usize) {
        if let Some(pool) = &self.pool {
            pool.scale_to(workers);
        }
    }

    pub fn buffers(&self) -> &[Arc<EventRing>] {
        &self.buffers
    }

    /// Aggregate statistics snapshot
    pub async fn stats(&self) -> PipelineStats {
        let ingest = stats::aggregate_ingest(self.ingestors.iter().map(|e| e.value().stats()));
        let uptime = self.started_at.elapsed().as_secs_f64();

        let active_workers = match &self.pool {
            Some(pool) => pool.worker_count().await,
            None => 0,
        };
        let pressure = match &self.controller {
            Some(controller) => controller.current_level(),
            None => crate::pressure::PressureLevel::Normal,
        };

        PipelineStats {
            events_per_sec: if uptime > 0.0 {
                ingest.ingested as f64 / uptime
            } else {
                0.0
            },
            ingest,
            correlation: self.correlation.snapshot(),
            avg_latency_us: self.latency.average_us(),
            p95_latency_us: self.latency.percentile_us(0.95),
            p99_latency_us: self.latency.percentile_us(0.99),
            buffers: self.buffers.iter().map(|b| b.stats()).collect(),
            active_workers,
            pressure,
            memory_rss_bytes: memory::rss_bytes().unwrap_or(0),
        }
    }

    /// Graceful shutdown: stop ingest, drain the rings, flush correlated
    /// batches to the sink, then join every task
    pub async fn shutdown(mut self) {
        tracing::info!("capture pipeline shutting down");
        self.enabled.store(false, Ordering::Relaxed);

        // Stop the controller first so it cannot fight the drain with
        // scaling or shedding directives
        if let Some(controller) = self.controller.take() {
            controller.shutdown().await;
        }

        // Let the workers catch up with whatever the rings still hold
        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while Instant::now() < deadline {
            if self.buffers.iter().all(|b| b.claimed_unread() == 0) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Stopping the pool drops the last router clones, which closes the
        // shard channels; shards flush what is queued and exit
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
        for handle in self.shard_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "correlator shard join error");
            }
        }

        for buffer in &self.buffers {
            buffer.destroy();
        }
        tracing::info!("capture pipeline stopped");
    }
}
