/*!
 * Partitions
 * A buffer + cursor pair, the unit of work assignment
 */

use crate::buffer::{EventRing, ReadCursor, RingBatch};
use crate::core::errors::BufferError;
use std::sync::Arc;

/// One drain assignment: a ring buffer and the cursor owned for it
///
/// Exclusive ownership is enforced by assignment, not by locks: the
/// supervisor hands each partition to exactly one worker at a time. The
/// cursor lives inside the shared `Arc`, so reassignment always carries the
/// current position and never resets it to zero.
#[derive(Debug)]
pub struct Partition {
    id: u32,
    buffer: Arc<EventRing>,
    cursor: ReadCursor,
}

impl Partition {
    pub fn new(id: u32, buffer: Arc<EventRing>) -> Self {
        let cursor = buffer.cursor();
        Self { id, buffer, cursor }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn buffer(&self) -> &Arc<EventRing> {
        &self.buffer
    }

    /// Cursor position the next drain will start from
    #[inline]
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Drain up to `max` events in cursor order
    #[inline]
    pub fn drain(&self, max: usize) -> Result<RingBatch, BufferError> {
        self.buffer.read_batch(&self.cursor, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::OverflowPolicy;
    use crate::core::types::{BufferId, ProducerId};
    use crate::event::{Payload, RawEvent};

    #[test]
    fn test_cursor_survives_across_references() {
        let ring = Arc::new(EventRing::new(BufferId(0), 16, OverflowPolicy::DropOldest));
        let partition = Arc::new(Partition::new(0, Arc::clone(&ring)));

        for i in 0..6 {
            ring.write(RawEvent::new(
                ProducerId(i),
                Payload::ProcessExit { exit_code: None },
            ))
            .unwrap();
        }

        assert_eq!(partition.drain(4).unwrap().events.len(), 4);
        assert_eq!(partition.position(), 4);

        // A reassigned handle to the same partition continues where the
        // previous owner stopped
        let reassigned = Arc::clone(&partition);
        assert_eq!(reassigned.drain(10).unwrap().events.len(), 2);
        assert_eq!(reassigned.position(), 6);
    }
}
