/*!
 * Ingest
 * Hot-path event capture: enabled gate, shedding, truncation, ring write
 */

mod ingestor;
mod shed;
mod truncate;

pub use ingestor::{IngestStats, Ingestor};
pub use shed::ShedGate;
