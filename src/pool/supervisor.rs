/*!
 * Pool Supervisor
 * Owns the worker registry, watches for crashes, reassigns partitions
 *
 * Crash recovery is an explicit registry plus deterministic round-robin
 * reassignment over survivors; a crashed worker's partitions keep their
 * live cursors, and events it had already forwarded are not re-processed
 * (recorded tradeoff - no at-least-once replay across crashes).
 */

use super::partition::Partition;
use super::worker::{Worker, WorkerMsg};
use crate::buffer::EventRing;
use crate::config::SharedConfig;
use crate::core::id::WorkerIdGenerator;
use crate::core::types::WorkerId;
use crate::correlate::CorrelatorRouter;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinSet};

/// Control messages for the supervisor task
#[derive(Debug)]
pub enum PoolCommand {
    /// Adjust the worker count (clamped to the configured floor/ceiling)
    ScaleTo(usize),
    /// Hard-abort one worker (fault injection for crash-recovery tests)
    TerminateWorker(WorkerId),
    /// Snapshot of {worker -> partition ids}
    Assignments(oneshot::Sender<Vec<(WorkerId, Vec<u32>)>>),
    /// Number of active (non-stopping) workers
    WorkerCount(oneshot::Sender<usize>),
    /// Stop all workers gracefully, then exit
    Shutdown,
}

/// Cloneable command surface to the supervisor
#[derive(Clone)]
pub struct PoolCommands {
    tx: mpsc::UnboundedSender<PoolCommand>,
}

impl PoolCommands {
    pub fn scale_to(&self, workers: usize) {
        let _ = self.tx.send(PoolCommand::ScaleTo(workers));
    }

    pub fn terminate_worker(&self, worker: WorkerId) {
        let _ = self.tx.send(PoolCommand::TerminateWorker(worker));
    }

    /// Current partition assignment; empty once the pool is gone
    pub async fn assignments(&self) -> Vec<(WorkerId, Vec<u32>)> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(PoolCommand::Assignments(reply)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn worker_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(PoolCommand::WorkerCount(reply)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Handle to the running pool
pub struct PoolHandle {
    commands: PoolCommands,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl PoolHandle {
    pub fn commands(&self) -> PoolCommands {
        self.commands.clone()
    }

    pub fn scale_to(&self, workers: usize) {
        self.commands.scale_to(workers);
    }

    pub fn terminate_worker(&self, worker: WorkerId) {
        self.commands.terminate_worker(worker);
    }

    pub async fn assignments(&self) -> Vec<(WorkerId, Vec<u32>)> {
        self.commands.assignments().await
    }

    pub async fn worker_count(&self) -> usize {
        self.commands.worker_count().await
    }

    /// Stop all workers gracefully and wait for the supervisor to exit
    pub async fn shutdown(mut self) {
        let _ = self.commands.tx.send(PoolCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Pool supervisor shutdown error: {}", e);
            }
        }
    }
}

impl Drop for PoolHandle {
    fn drop(&mut self) {
        // Best-effort graceful stop if shutdown() was never awaited
        if self.handle.is_some() {
            let _ = self.commands.tx.send(PoolCommand::Shutdown);
        }
    }
}

/// The asynchronous worker pool
pub struct WorkerPool;

impl WorkerPool {
    /// Create one partition per buffer and spawn the supervisor with the
    /// configured target worker count
    pub fn start(
        buffers: &[Arc<EventRing>],
        config: SharedConfig,
        router: CorrelatorRouter,
    ) -> PoolHandle {
        let partitions: Vec<Arc<Partition>> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| Arc::new(Partition::new(i as u32, Arc::clone(buffer))))
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let initial = config.load().workers_target;

        let supervisor = Supervisor {
            config,
            router,
            partitions,
            workers: HashMap::new(),
            task_ids: HashMap::new(),
            ids: WorkerIdGenerator::new(),
            join_set: JoinSet::new(),
            command_rx: rx,
            shutting_down: false,
        };

        let handle = tokio::spawn(supervisor.run(initial));
        log::info!("Worker pool started with {} workers", initial);

        PoolHandle {
            commands: PoolCommands { tx },
            handle: Some(handle),
        }
    }
}

struct WorkerEntry {
    control: mpsc::UnboundedSender<WorkerMsg>,
    abort: AbortHandle,
    partitions: Vec<Arc<Partition>>,
    stopping: bool,
}

struct Supervisor {
    config: SharedConfig,
    router: CorrelatorRouter,
    /// Canonical full partition list; assignment views derive from it
    partitions: Vec<Arc<Partition>>,
    workers: HashMap<WorkerId, WorkerEntry>,
    task_ids: HashMap<tokio::task::Id, WorkerId>,
    ids: WorkerIdGenerator,
    join_set: JoinSet<WorkerId>,
    command_rx: mpsc::UnboundedReceiver<PoolCommand>,
    shutting_down: bool,
}

impl Supervisor {
    async fn run(mut self, initial_workers: usize) {
        let bounds = self.config.load();
        let initial = initial_workers.clamp(bounds.workers_min, bounds.workers_max);
        drop(bounds);

        for _ in 0..initial {
            self.spawn_worker(Vec::new());
        }
        self.rebalance();

        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => self.handle_command(command),
                Some(result) = self.join_set.join_next_with_id() => self.on_worker_exit(result),
                else => break,
            }

            if self.shutting_down && self.workers.is_empty() {
                break;
            }
        }

        log::info!("Worker pool supervisor exited");
    }

    fn handle_command(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::ScaleTo(workers) => self.scale_to(workers),
            PoolCommand::TerminateWorker(worker) => {
                if let Some(entry) = self.workers.get(&worker) {
                    log::warn!("Terminating worker {} (fault injection)", worker);
                    entry.abort.abort();
                }
            }
            PoolCommand::Assignments(reply) => {
                let mut view: Vec<(WorkerId, Vec<u32>)> = self
                    .workers
                    .iter()
                    .filter(|(_, entry)| !entry.stopping)
                    .map(|(id, entry)| {
                        (*id, entry.partitions.iter().map(|p| p.id()).collect())
                    })
                    .collect();
                view.sort_by_key(|(id, _)| *id);
                let _ = reply.send(view);
            }
            PoolCommand::WorkerCount(reply) => {
                let _ = reply.send(self.active_count());
            }
            PoolCommand::Shutdown => {
                self.shutting_down = true;
                log::info!("Worker pool shutting down, stopping {} workers", self.workers.len());
                for entry in self.workers.values_mut() {
                    let _ = entry.control.send(WorkerMsg::Stop);
                    entry.stopping = true;
                }
            }
        }
    }

    fn on_worker_exit(
        &mut self,
        result: Result<(tokio::task::Id, WorkerId), tokio::task::JoinError>,
    ) {
        match result {
            Ok((task_id, worker_id)) => {
                self.task_ids.remove(&task_id);
                if let Some(entry) = self.workers.remove(&worker_id) {
                    self.ids.recycle(worker_id);
                    if !entry.stopping && !self.shutting_down {
                        // Correlator channels closed underneath it; nothing
                        // left to drain into
                        log::debug!("Worker {} exited early, not replacing", worker_id);
                    }
                }
            }
            Err(join_error) => {
                let Some(worker_id) = self.task_ids.remove(&join_error.id()) else {
                    return;
                };
                let Some(entry) = self.workers.remove(&worker_id) else {
                    return;
                };
                self.ids.recycle(worker_id);

                if self.shutting_down {
                    return;
                }

                log::warn!(
                    "Worker {} crashed ({}), reassigning {} partitions",
                    worker_id,
                    if join_error.is_panic() { "panic" } else { "aborted" },
                    entry.partitions.len()
                );

                // Restore the floor first so reassignment has somewhere to go
                let floor = self.config.load().workers_min;
                while self.active_count() < floor {
                    self.spawn_worker(Vec::new());
                }
                self.rebalance();
            }
        }
    }

    fn scale_to(&mut self, workers: usize) {
        if self.shutting_down {
            return;
        }
        let bounds = self.config.load();
        let desired = workers.clamp(bounds.workers_min, bounds.workers_max);
        drop(bounds);

        let current = self.active_count();
        if desired > current {
            for _ in 0..(desired - current) {
                self.spawn_worker(Vec::new());
            }
            log::info!("Scaled up: {} -> {} workers", current, desired);
            self.rebalance();
        } else if desired < current {
            // Deterministic victims: highest worker ids first
            let mut active: Vec<WorkerId> = self
                .workers
                .iter()
                .filter(|(_, entry)| !entry.stopping)
                .map(|(id, _)| *id)
                .collect();
            active.sort_unstable();

            for victim in active.into_iter().rev().take(current - desired) {
                if let Some(entry) = self.workers.get_mut(&victim) {
                    let _ = entry.control.send(WorkerMsg::Stop);
                    entry.stopping = true;
                    entry.partitions.clear();
                }
            }
            log::info!("Scaled down: {} -> {} workers", current, desired);
            self.rebalance();
        }
    }

    /// Deterministic round-robin of the canonical partition list over the
    /// active workers, in ascending worker-id order
    fn rebalance(&mut self) {
        let mut active: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|(_, entry)| !entry.stopping)
            .map(|(id, _)| *id)
            .collect();
        if active.is_empty() {
            return;
        }
        active.sort_unstable();

        for (slot, worker_id) in active.iter().enumerate() {
            let partitions: Vec<Arc<Partition>> = self
                .partitions
                .iter()
                .enumerate()
                .filter(|(i, _)| i % active.len() == slot)
                .map(|(_, p)| Arc::clone(p))
                .collect();

            if let Some(entry) = self.workers.get_mut(worker_id) {
                entry.partitions = partitions.clone();
                let _ = entry.control.send(WorkerMsg::Assign(partitions));
            }
        }
    }

    fn spawn_worker(&mut self, partitions: Vec<Arc<Partition>>) -> WorkerId {
        let id = self.ids.next();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            id,
            partitions: partitions.clone(),
            control: control_rx,
            router: self.router.clone(),
            config: self.config.clone(),
        };

        let abort = self.join_set.spawn(worker.run());
        self.task_ids.insert(abort.id(), id);
        self.workers.insert(
            id,
            WorkerEntry {
                control: control_tx,
                abort,
                partitions,
                stopping: false,
            },
        );
        log::debug!("Spawned worker {}", id);
        id
    }

    fn active_count(&self) -> usize {
        self.workers
            .values()
            .filter(|entry| !entry.stopping)
            .count()
    }
}
