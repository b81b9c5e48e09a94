/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::{InlineString, WorkerId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ring buffer errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum BufferError {
    #[error("Buffer full: {0} slots claimed but unread")]
    #[diagnostic(
        code(buffer::full),
        help("Under the reject policy the caller decides: drop locally or retry. Consider drop_oldest or a larger capacity.")
    )]
    Full(u64),

    #[error("Buffer destroyed")]
    #[diagnostic(
        code(buffer::destroyed),
        help("All cursors were invalidated when the buffer was destroyed.")
    )]
    Destroyed,
}

/// Configuration validation errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("Buffer capacity {0} is not a power of two")]
    #[diagnostic(
        code(config::capacity_not_power_of_two),
        help("Slot indexing uses `position & (capacity - 1)`; pick 1024, 4096, 65536, ...")
    )]
    CapacityNotPowerOfTwo(usize),

    #[error("Correlator shard count {0} is not a power of two")]
    #[diagnostic(
        code(config::shards_not_power_of_two),
        help("Shard routing uses `hash & (shards - 1)`; pick 1, 2, 4, 8, ...")
    )]
    ShardsNotPowerOfTwo(usize),

    #[error("Invalid worker bounds: min {min}, target {target}, max {max}")]
    #[diagnostic(
        code(config::invalid_worker_bounds),
        help("Worker bounds must satisfy 1 <= min <= target <= max.")
    )]
    InvalidWorkerBounds { min: usize, target: usize, max: usize },

    #[error("Invalid sampling rate: {0} (must be 0-100)")]
    #[diagnostic(
        code(config::invalid_sampling_rate),
        help("The shed sampling rate is a percentage of events kept while shedding.")
    )]
    InvalidSamplingRate(u8),

    #[error("Buffer count must be at least 1")]
    #[diagnostic(
        code(config::no_buffers),
        help("The pipeline needs at least one ring buffer to ingest into.")
    )]
    NoBuffers,
}

/// Worker pool errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum PoolError {
    #[error("Worker pool is shutting down")]
    #[diagnostic(
        code(pool::shutting_down),
        help("Commands are rejected once shutdown has begun.")
    )]
    ShuttingDown,

    #[error("Worker {0} not found")]
    #[diagnostic(
        code(pool::worker_not_found),
        help("The worker may have crashed and been replaced under a new id.")
    )]
    WorkerNotFound(WorkerId),
}

/// Wire codec errors for cross-process event transport
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum CodecError {
    #[error("Unsupported wire version {0}")]
    #[diagnostic(
        code(codec::unsupported_version),
        help("The frame was produced by an incompatible capture library version.")
    )]
    UnsupportedVersion(u8),

    #[error("Truncated frame: {0} bytes")]
    #[diagnostic(
        code(codec::truncated_frame),
        help("A frame needs at least a version byte followed by the encoded event.")
    )]
    TruncatedFrame(usize),

    #[error("Encode failed: {0}")]
    #[diagnostic(code(codec::encode_failed))]
    Encode(InlineString),

    #[error("Decode failed: {0}")]
    #[diagnostic(code(codec::decode_failed))]
    Decode(InlineString),
}

/// Downstream storage boundary errors
///
/// Produced by `StorageSink` implementations; the pipeline logs and drops the
/// batch on any of these (recorded tradeoff, no unbounded retry).
#[derive(Error, Debug, Diagnostic)]
pub enum StorageError {
    #[error("Storage backend rejected batch: {0}")]
    #[diagnostic(
        code(storage::rejected),
        help("The batch was dropped; the storage_failures counter records it.")
    )]
    Rejected(InlineString),

    #[error("Storage backend unavailable: {0}")]
    #[diagnostic(
        code(storage::unavailable),
        help("Check backend connectivity. Batches are dropped, not queued, while unavailable.")
    )]
    Unavailable(InlineString),

    #[error("Storage serialization failed: {0}")]
    #[diagnostic(code(storage::serialization_failed))]
    Serialization(InlineString),

    #[error("Storage I/O error: {0}")]
    #[diagnostic(code(storage::io))]
    Io(#[from] std::io::Error),
}

/// Unified pipeline error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum CaptureError {
    #[error("Buffer error: {0}")]
    #[diagnostic(transparent)]
    Buffer(#[from] BufferError),

    #[error("Config error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Pool error: {0}")]
    #[diagnostic(transparent)]
    Pool(#[from] PoolError),

    #[error("Codec error: {0}")]
    #[diagnostic(transparent)]
    Codec(#[from] CodecError),

    #[error("Storage error: {0}")]
    #[diagnostic(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_error_display() {
        let err = BufferError::Full(1024);
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_config_error_serde_roundtrip() {
        let err = ConfigError::CapacityNotPowerOfTwo(1000);
        let json = serde_json::to_string(&err).unwrap();
        let back: ConfigError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_capture_error_from_buffer() {
        let err: CaptureError = BufferError::Destroyed.into();
        assert!(matches!(err, CaptureError::Buffer(BufferError::Destroyed)));
    }
}
