/*!
 * Storage Boundary
 * The downstream interface correlated batches are handed to
 *
 * The pipeline's contract on failure is log-and-drop with a counter: a batch
 * is never retried indefinitely, so a broken backend cannot grow memory.
 */

use crate::core::errors::StorageError;
use crate::event::CorrelatedEvent;
use parking_lot::Mutex;
use std::io::Write;

/// Consumer of ordered correlated batches
///
/// Implementations must tolerate being called concurrently from multiple
/// correlator shards.
#[cfg_attr(test, mockall::automock)]
pub trait StorageSink: Send + Sync {
    fn write_batch(&self, batch: Vec<CorrelatedEvent>) -> Result<(), StorageError>;
}

/// In-memory sink for tests and local inspection
#[derive(Default)]
pub struct VecSink {
    events: Mutex<Vec<CorrelatedEvent>>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<CorrelatedEvent> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn snapshot(&self) -> Vec<CorrelatedEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl StorageSink for VecSink {
    fn write_batch(&self, batch: Vec<CorrelatedEvent>) -> Result<(), StorageError> {
        self.events.lock().extend(batch);
        Ok(())
    }
}

/// Debug sink that serializes each correlated event as one JSON line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> StorageSink for JsonLinesSink<W> {
    fn write_batch(&self, batch: Vec<CorrelatedEvent>) -> Result<(), StorageError> {
        let mut writer = self.writer.lock();
        for event in &batch {
            let line = serde_json::to_string(event)
                .map_err(|e| StorageError::Serialization(e.to_string().into()))?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CorrelationId, ProducerId, WorkerId};
    use crate::event::{EnrichedEvent, Payload, RawEvent};
    use std::sync::Arc;

    fn correlated() -> CorrelatedEvent {
        CorrelatedEvent::root(
            EnrichedEvent::new(
                Arc::new(RawEvent::new(
                    ProducerId(1),
                    Payload::ProcessExit { exit_code: Some(0) },
                )),
                WorkerId(1),
                0,
            ),
            CorrelationId(1),
        )
    }

    #[test]
    fn test_vec_sink_accumulates() {
        let sink = VecSink::new();
        sink.write_batch(vec![correlated(), correlated()]).unwrap();
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.write_batch(vec![correlated(), correlated()]).unwrap();

        let buf = sink.into_inner();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"correlation_id\":1"));
    }
}
