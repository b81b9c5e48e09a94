/*!
 * Correlation
 * Causal event correlation: call pairing, message matching, chain linkage
 */

mod correlator;
mod shard;
mod state;

pub use correlator::{CorrelationSnapshot, Correlator, CorrelatorCounters};
pub use shard::{CorrelatorRouter, ShardedCorrelator};
pub use state::{CorrelationState, MessageSignature, PendingSend, StackEntry};
