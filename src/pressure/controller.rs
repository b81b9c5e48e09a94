/*!
 * Backpressure Controller
 * Samples pipeline load and issues advisory scaling/shedding directives
 *
 * Observes buffer occupancy, rolling batch latency, and memory usage; it
 * never mutates buffer or correlator state directly. At critical pressure
 * it additionally opens the ingest shed gate and forces rings toward
 * drop-oldest so claimed slots cannot pile up behind rejecting writers.
 */

use super::latency::LatencyTracker;
use super::memory;
use crate::buffer::EventRing;
use crate::config::{CaptureConfig, PressureThresholds, SharedConfig};
use crate::ingest::ShedGate;
use crate::pool::PoolCommands;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Coarse classification of system load
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum PressureLevel {
    Normal = 0,
    Elevated = 1,
    High = 2,
    Critical = 3,
}

impl PressureLevel {
    fn from_u8(value: u8) -> Self {
        match value {
            3 => PressureLevel::Critical,
            2 => PressureLevel::High,
            1 => PressureLevel::Elevated,
            _ => PressureLevel::Normal,
        }
    }
}

/// Advisory worker-count change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingAction {
    /// Scale up to this many workers
    ScaleUp(usize),
    /// Scale down to this many workers
    ScaleDown(usize),
    Maintain,
}

/// One observation of the pipeline's load inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSample {
    /// Worst claimed-but-unread ratio across buffers, 0.0 to 1.0
    pub occupancy: f64,
    /// Rolling batch receive-to-correlate latency
    pub latency: Duration,
    /// Process RSS over the configured memory budget
    pub memory_ratio: f64,
}

/// Classify a sample against the configured thresholds
pub fn classify(sample: &PressureSample, thresholds: &PressureThresholds) -> PressureLevel {
    if sample.occupancy > thresholds.occupancy_critical
        || sample.memory_ratio > thresholds.memory_critical
    {
        PressureLevel::Critical
    } else if sample.occupancy > thresholds.occupancy_high
        || sample.latency > thresholds.latency_high
    {
        PressureLevel::High
    } else if sample.occupancy > thresholds.occupancy_elevated
        || sample.latency > thresholds.latency_elevated
    {
        PressureLevel::Elevated
    } else {
        PressureLevel::Normal
    }
}

/// Scaling recommendation for a pressure level
///
/// Scale-down never drops below the floor; scale-up never exceeds the
/// ceiling, even when issued repeatedly.
pub fn recommend(level: PressureLevel, current_workers: usize, config: &CaptureConfig) -> ScalingAction {
    match level {
        PressureLevel::Critical => {
            let desired = (current_workers + config.max_scale_step).min(config.workers_max);
            if desired > current_workers {
                ScalingAction::ScaleUp(desired)
            } else {
                ScalingAction::Maintain
            }
        }
        PressureLevel::High => {
            let step = (config.max_scale_step / 2).max(1);
            let desired = (current_workers + step).min(config.workers_max);
            if desired > current_workers {
                ScalingAction::ScaleUp(desired)
            } else {
                ScalingAction::Maintain
            }
        }
        PressureLevel::Elevated => {
            if current_workers < config.workers_target {
                ScalingAction::ScaleUp(current_workers + 1)
            } else {
                ScalingAction::Maintain
            }
        }
        PressureLevel::Normal => {
            if current_workers > config.workers_min {
                ScalingAction::ScaleDown(current_workers - 1)
            } else {
                ScalingAction::Maintain
            }
        }
    }
}

/// The pressure observer
pub struct BackpressureController {
    buffers: Vec<Arc<EventRing>>,
    latency: Arc<LatencyTracker>,
    shed: Arc<ShedGate>,
    config: SharedConfig,
}

impl BackpressureController {
    pub fn new(
        buffers: Vec<Arc<EventRing>>,
        latency: Arc<LatencyTracker>,
        shed: Arc<ShedGate>,
        config: SharedConfig,
    ) -> Self {
        Self {
            buffers,
            latency,
            shed,
            config,
        }
    }

    /// Observe the current load inputs
    pub fn sample(&self) -> PressureSample {
        let occupancy = self
            .buffers
            .iter()
            .map(|b| b.occupancy())
            .fold(0.0, f64::max);

        let memory_ratio = match memory::rss_bytes() {
            Some(rss) => rss as f64 / self.config.load().memory_limit_bytes as f64,
            None => 0.0,
        };

        PressureSample {
            occupancy,
            latency: Duration::from_micros(self.latency.ewma_us()),
            memory_ratio,
        }
    }

    /// Classify the current sample
    pub fn level(&self) -> PressureLevel {
        classify(&self.sample(), &self.config.load().thresholds)
    }

    /// Scaling recommendation for the current level
    pub fn recommend_scaling(&self, current_workers: usize) -> ScalingAction {
        recommend(self.level(), current_workers, &self.config.load())
    }

    /// Spawn the timer-driven control task
    pub fn spawn(self, pool: PoolCommands) -> ControllerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let level = Arc::new(AtomicU8::new(PressureLevel::Normal as u8));
        let level_out = Arc::clone(&level);

        let handle = tokio::spawn(run_controller_loop(self, pool, rx, level));
        log::info!("Backpressure controller started");

        ControllerHandle {
            tx,
            level: level_out,
            handle: Some(handle),
        }
    }
}

/// Control messages for the controller task
#[derive(Debug)]
enum ControllerCommand {
    Shutdown,
}

/// Handle to the running controller task
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControllerCommand>,
    level: Arc<AtomicU8>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ControllerHandle {
    /// Most recently sampled pressure level
    pub fn current_level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub async fn shutdown(mut self) {
        let _ = self.tx.send(ControllerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                log::warn!("Backpressure controller shutdown error: {}", e);
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.tx.send(ControllerCommand::Shutdown);
        }
    }
}

async fn run_controller_loop(
    controller: BackpressureController,
    pool: PoolCommands,
    mut command_rx: mpsc::UnboundedReceiver<ControllerCommand>,
    level_out: Arc<AtomicU8>,
) {
    let mut interval = tokio::time::interval(controller.config.load().pressure_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_level = PressureLevel::Normal;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let config = controller.config.load();
                let sample = controller.sample();
                let level = classify(&sample, &config.thresholds);
                level_out.store(level as u8, Ordering::Relaxed);

                if level != last_level {
                    log::info!(
                        "Pressure {:?} -> {:?} (occupancy {:.2}, latency {:?}, memory {:.2})",
                        last_level, level, sample.occupancy, sample.latency, sample.memory_ratio
                    );
                }

                // Shedding and forced drop-oldest engage at critical and
                // release only once pressure is fully back to normal
                if level == PressureLevel::Critical {
                    controller.shed.set_active(true);
                    controller.shed.set_keep_pct(config.shed_keep_pct);
                    for buffer in &controller.buffers {
                        buffer.set_force_drop_oldest(true);
                    }
                } else if level == PressureLevel::Normal && last_level != PressureLevel::Normal {
                    controller.shed.set_active(false);
                    for buffer in &controller.buffers {
                        buffer.set_force_drop_oldest(false);
                    }
                }

                let current = pool.worker_count().await;
                match recommend(level, current, &config) {
                    ScalingAction::ScaleUp(n) | ScalingAction::ScaleDown(n) => pool.scale_to(n),
                    ScalingAction::Maintain => {}
                }

                last_level = level;
            }

            command = command_rx.recv() => match command {
                Some(ControllerCommand::Shutdown) | None => {
                    log::info!("Backpressure controller shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(occupancy: f64, latency_ms: u64, memory_ratio: f64) -> PressureSample {
        PressureSample {
            occupancy,
            latency: Duration::from_millis(latency_ms),
            memory_ratio,
        }
    }

    #[test]
    fn test_classify_thresholds() {
        let t = PressureThresholds::default();
        assert_eq!(classify(&sample(0.10, 1, 0.1), &t), PressureLevel::Normal);
        assert_eq!(classify(&sample(0.60, 1, 0.1), &t), PressureLevel::Elevated);
        assert_eq!(classify(&sample(0.10, 25, 0.1), &t), PressureLevel::Elevated);
        assert_eq!(classify(&sample(0.85, 1, 0.1), &t), PressureLevel::High);
        assert_eq!(classify(&sample(0.10, 60, 0.1), &t), PressureLevel::High);
        assert_eq!(classify(&sample(0.97, 1, 0.1), &t), PressureLevel::Critical);
        assert_eq!(classify(&sample(0.10, 1, 0.95), &t), PressureLevel::Critical);
    }

    #[test]
    fn test_recommend_scale_up_respects_ceiling() {
        let config = CaptureConfig {
            workers_min: 1,
            workers_target: 2,
            workers_max: 4,
            max_scale_step: 4,
            ..Default::default()
        };

        // First critical recommendation jumps toward the ceiling
        let action = recommend(PressureLevel::Critical, 2, &config);
        assert_eq!(action, ScalingAction::ScaleUp(4));

        // Issuing it again at the ceiling holds steady
        let action = recommend(PressureLevel::Critical, 4, &config);
        assert_eq!(action, ScalingAction::Maintain);
    }

    #[test]
    fn test_recommend_elevated_steps_toward_target() {
        let config = CaptureConfig {
            workers_min: 1,
            workers_target: 3,
            workers_max: 8,
            ..Default::default()
        };
        assert_eq!(
            recommend(PressureLevel::Elevated, 1, &config),
            ScalingAction::ScaleUp(2)
        );
        assert_eq!(
            recommend(PressureLevel::Elevated, 3, &config),
            ScalingAction::Maintain
        );
    }

    #[test]
    fn test_recommend_normal_decays_to_floor() {
        let config = CaptureConfig {
            workers_min: 2,
            workers_target: 4,
            workers_max: 8,
            ..Default::default()
        };
        assert_eq!(
            recommend(PressureLevel::Normal, 4, &config),
            ScalingAction::ScaleDown(3)
        );
        assert_eq!(
            recommend(PressureLevel::Normal, 2, &config),
            ScalingAction::Maintain
        );
    }

    #[test]
    fn test_high_scales_moderately() {
        let config = CaptureConfig {
            workers_min: 1,
            workers_target: 2,
            workers_max: 8,
            max_scale_step: 4,
            ..Default::default()
        };
        assert_eq!(
            recommend(PressureLevel::High, 2, &config),
            ScalingAction::ScaleUp(4)
        );
    }

    #[test]
    fn test_level_ordering() {
        assert!(PressureLevel::Critical > PressureLevel::High);
        assert!(PressureLevel::High > PressureLevel::Elevated);
        assert!(PressureLevel::Elevated > PressureLevel::Normal);
    }
}
