/*!
 * Core Primitives
 * Shared types, errors, id generation, and tunable limits
 */

pub mod errors;
pub mod id;
pub mod limits;
pub mod types;

pub use errors::{BufferError, CaptureError, CodecError, ConfigError, PoolError, StorageError};
pub use id::{CorrelationIdGenerator, WorkerIdGenerator};
pub use types::{
    monotonic_ns, wall_time_us, BufferId, CaptureResult, CorrelationId, InlineString, ProducerId,
    WorkerId,
};
