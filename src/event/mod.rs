/*!
 * Event Model
 * Raw capture events, drain-time enrichment, and correlated output records
 */

pub mod codec;
mod correlated;
mod enriched;
mod raw;

pub use correlated::{CorrelatedEvent, LinkKind};
pub use enriched::EnrichedEvent;
pub use raw::{EventKind, Payload, RawEvent};
