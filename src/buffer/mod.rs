/*!
 * Ring Buffers
 * Lock-free ingestion buffers with independent reader cursors
 */

mod cursor;
mod ring;

pub use cursor::ReadCursor;
pub use ring::{EventRing, OverflowPolicy, RingBatch, RingStats};
