/*!
 * Drain Workers
 * Per-worker loop: batch read, enrich, forward, bounded backoff when idle
 */

use super::partition::Partition;
use crate::config::SharedConfig;
use crate::core::limits::{DRAIN_BACKOFF_MAX, DRAIN_BACKOFF_MIN};
use crate::core::types::WorkerId;
use crate::correlate::CorrelatorRouter;
use crate::event::EnrichedEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Control messages a worker accepts from the supervisor
#[derive(Debug)]
pub(super) enum WorkerMsg {
    /// Replace this worker's partition set (carries live cursors)
    Assign(Vec<Arc<Partition>>),
    /// Finish the current drain pass, then exit
    Stop,
}

/// Bounded exponential backoff for idle buffers
pub(super) struct Backoff {
    current: Duration,
}

impl Backoff {
    pub(super) fn new() -> Self {
        Self {
            current: DRAIN_BACKOFF_MIN,
        }
    }

    /// Next sleep duration, doubling up to the ceiling
    pub(super) fn next(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(DRAIN_BACKOFF_MAX);
        delay
    }

    pub(super) fn reset(&mut self) {
        self.current = DRAIN_BACKOFF_MIN;
    }
}

pub(super) struct Worker {
    pub(super) id: WorkerId,
    pub(super) partitions: Vec<Arc<Partition>>,
    pub(super) control: mpsc::UnboundedReceiver<WorkerMsg>,
    pub(super) router: CorrelatorRouter,
    pub(super) config: SharedConfig,
}

impl Worker {
    /// The drain loop; returns the worker's id on clean exit
    ///
    /// A `Stop` takes effect between drain passes, so the current batch is
    /// always either fully forwarded or never started - no half batch can
    /// reach the correlator.
    pub(super) async fn run(mut self) -> WorkerId {
        let mut backoff = Backoff::new();
        let mut batch_sequence = 0u64;

        loop {
            // Apply pending control messages without blocking the drain
            loop {
                match self.control.try_recv() {
                    Ok(WorkerMsg::Assign(partitions)) => self.partitions = partitions,
                    Ok(WorkerMsg::Stop) => return self.id,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => return self.id,
                }
            }

            let batch_size = self.config.load().batch_size;
            let mut drained_any = false;

            for partition in &self.partitions {
                let batch = match partition.drain(batch_size) {
                    Ok(batch) => batch,
                    // Destroyed buffer: nothing more will ever come from it
                    Err(_) => continue,
                };
                if batch.events.is_empty() {
                    continue;
                }

                drained_any = true;
                batch_sequence += 1;
                let enriched: Vec<EnrichedEvent> = batch
                    .events
                    .into_iter()
                    .map(|event| EnrichedEvent::new(event, self.id, batch_sequence))
                    .collect();

                if self.router.dispatch(enriched).await.is_err() {
                    log::debug!("Worker {} stopping: correlator channels closed", self.id);
                    return self.id;
                }
            }

            if drained_any {
                backoff.reset();
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(backoff.next()) => {}
                    msg = self.control.recv() => match msg {
                        Some(WorkerMsg::Assign(partitions)) => {
                            self.partitions = partitions;
                            backoff.reset();
                        }
                        Some(WorkerMsg::Stop) | None => return self.id,
                    }
                }
            }
        }
    }
}
