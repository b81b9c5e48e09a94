/*!
 * Weft Capture
 * Event capture and causal correlation core for the Weft tracing platform
 *
 * Data flow: instrumented call sites -> Ingestor -> EventRing ->
 * WorkerPool (batched drain) -> correlator shards -> StorageSink.
 * The BackpressureController samples the whole path and feeds scaling and
 * shedding directives back into it.
 */

pub mod buffer;
pub mod config;
pub mod core;
pub mod correlate;
pub mod event;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod pressure;
pub mod sink;

// Re-exports
pub use buffer::{EventRing, OverflowPolicy, ReadCursor};
pub use config::{CaptureConfig, PressureThresholds, SharedConfig, TruncationLimits};
pub use crate::core::errors::{BufferError, CaptureError, CodecError, ConfigError, StorageError};
pub use crate::core::types::{BufferId, CaptureResult, CorrelationId, ProducerId, WorkerId};
pub use correlate::{CorrelationSnapshot, Correlator};
pub use event::{CorrelatedEvent, EnrichedEvent, EventKind, LinkKind, Payload, RawEvent};
pub use ingest::{IngestStats, Ingestor};
pub use logging::init_tracing;
pub use pipeline::{Pipeline, PipelineStats};
pub use pool::{PoolHandle, WorkerPool};
pub use pressure::{BackpressureController, PressureLevel, ScalingAction};
pub use sink::{JsonLinesSink, StorageSink, VecSink};
