/*!
 * Worker Pool
 * Supervised async drain workers over disjoint buffer partitions
 */

mod partition;
mod supervisor;
mod worker;

pub use partition::Partition;
pub use supervisor::{PoolCommand, PoolCommands, PoolHandle, WorkerPool};
