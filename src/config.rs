/*!
 * Pipeline Configuration
 * Startup configuration with an atomically hot-swappable subset
 */

use crate::buffer::OverflowPolicy;
use crate::core::errors::ConfigError;
use crate::core::limits;
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Payload truncation limits applied on the ingest hot path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationLimits {
    /// Maximum bytes retained per payload string
    pub max_string_bytes: usize,
}

impl Default for TruncationLimits {
    fn default() -> Self {
        Self {
            max_string_bytes: limits::MAX_PAYLOAD_STRING_BYTES,
        }
    }
}

/// Pressure classification thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureThresholds {
    pub occupancy_elevated: f64,
    pub occupancy_high: f64,
    pub occupancy_critical: f64,
    pub latency_elevated: Duration,
    pub latency_high: Duration,
    pub memory_critical: f64,
}

impl Default for PressureThresholds {
    fn default() -> Self {
        Self {
            occupancy_elevated: limits::OCCUPANCY_ELEVATED,
            occupancy_high: limits::OCCUPANCY_HIGH,
            occupancy_critical: limits::OCCUPANCY_CRITICAL,
            latency_elevated: limits::LATENCY_ELEVATED,
            latency_high: limits::LATENCY_HIGH,
            memory_critical: limits::MEMORY_CRITICAL,
        }
    }
}

/// Full pipeline configuration, read at startup
///
/// The hot-updatable subset (batch size, correlation TTL, worker bounds,
/// pressure thresholds, shed rate) takes effect on the next loop iteration
/// of each background task after `SharedConfig::update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Ring capacity; must be a power of two
    pub buffer_capacity: usize,
    /// Number of independent ring buffers (one drain partition each)
    pub buffer_count: usize,
    pub overflow_policy: OverflowPolicy,

    /// Events drained per batch read (hot-updatable)
    pub batch_size: usize,

    /// Correlator shard count; must be a power of two
    pub correlator_shards: usize,
    /// Bounded depth of each worker -> correlator channel
    pub channel_depth: usize,
    /// Pending correlation state TTL (hot-updatable)
    pub correlation_ttl: Duration,
    /// Interval between correlation state sweeps
    pub cleanup_interval: Duration,

    /// Worker count bounds (hot-updatable)
    pub workers_min: usize,
    pub workers_target: usize,
    pub workers_max: usize,
    /// Largest single scale-up step
    pub max_scale_step: usize,

    /// Pressure thresholds (hot-updatable)
    pub thresholds: PressureThresholds,
    /// Memory budget the RSS ratio is measured against
    pub memory_limit_bytes: u64,
    /// Controller sampling interval
    pub pressure_interval: Duration,

    /// Percentage of events kept while shedding, 0-100 (hot-updatable)
    pub shed_keep_pct: u8,
    pub truncation: TruncationLimits,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: limits::DEFAULT_RING_CAPACITY,
            buffer_count: limits::DEFAULT_BUFFER_COUNT,
            overflow_policy: OverflowPolicy::DropOldest,
            batch_size: limits::DEFAULT_BATCH_SIZE,
            correlator_shards: limits::DEFAULT_CORRELATOR_SHARDS,
            channel_depth: limits::CORRELATOR_CHANNEL_DEPTH,
            correlation_ttl: limits::DEFAULT_CORRELATION_TTL,
            cleanup_interval: limits::DEFAULT_CLEANUP_INTERVAL,
            workers_min: limits::DEFAULT_WORKERS_MIN,
            workers_target: limits::DEFAULT_WORKERS_TARGET,
            workers_max: limits::DEFAULT_WORKERS_MAX,
            max_scale_step: limits::DEFAULT_MAX_SCALE_STEP,
            thresholds: PressureThresholds::default(),
            memory_limit_bytes: limits::DEFAULT_MEMORY_LIMIT,
            pressure_interval: limits::PRESSURE_SAMPLE_INTERVAL,
            shed_keep_pct: limits::DEFAULT_SHED_KEEP_PCT,
            truncation: TruncationLimits::default(),
        }
    }
}

impl CaptureConfig {
    /// Validate invariants that would otherwise surface as runtime faults
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 || !self.buffer_capacity.is_power_of_two() {
            return Err(ConfigError::CapacityNotPowerOfTwo(self.buffer_capacity));
        }
        if self.correlator_shards == 0 || !self.correlator_shards.is_power_of_two() {
            return Err(ConfigError::ShardsNotPowerOfTwo(self.correlator_shards));
        }
        if self.buffer_count == 0 {
            return Err(ConfigError::NoBuffers);
        }
        if self.workers_min == 0
            || self.workers_min > self.workers_target
            || self.workers_target > self.workers_max
        {
            return Err(ConfigError::InvalidWorkerBounds {
                min: self.workers_min,
                target: self.workers_target,
                max: self.workers_max,
            });
        }
        if self.shed_keep_pct > 100 {
            return Err(ConfigError::InvalidSamplingRate(self.shed_keep_pct));
        }
        Ok(())
    }
}

/// Atomically shared configuration
///
/// Background tasks load a fresh snapshot each loop iteration, so updates to
/// the hot subset take effect without restarting anything.
#[derive(Clone)]
pub struct SharedConfig {
    inner: Arc<ArcSwap<CaptureConfig>>,
}

impl SharedConfig {
    pub fn new(config: CaptureConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(config)),
        })
    }

    /// Current snapshot (cheap, lock-free)
    #[inline]
    pub fn load(&self) -> Arc<CaptureConfig> {
        self.inner.load_full()
    }

    /// Apply a mutation to a copy of the config and swap it in atomically
    ///
    /// The mutated config is re-validated; on failure the running config is
    /// left untouched.
    pub fn update<F>(&self, mutate: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut CaptureConfig),
    {
        let mut next = (**self.inner.load()).clone();
        mutate(&mut next);
        next.validate()?;
        self.inner.store(Arc::new(next));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_capacity() {
        let config = CaptureConfig {
            buffer_capacity: 1000,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::CapacityNotPowerOfTwo(1000))
        );
    }

    #[test]
    fn test_rejects_inverted_worker_bounds() {
        let config = CaptureConfig {
            workers_min: 4,
            workers_target: 2,
            workers_max: 8,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWorkerBounds { .. })
        ));
    }

    #[test]
    fn test_hot_update_swaps_snapshot() {
        let shared = SharedConfig::new(CaptureConfig::default()).unwrap();
        let before = shared.load().batch_size;

        shared.update(|c| c.batch_size = before * 2).unwrap();
        assert_eq!(shared.load().batch_size, before * 2);
    }

    #[test]
    fn test_invalid_update_leaves_config_untouched() {
        let shared = SharedConfig::new(CaptureConfig::default()).unwrap();
        let before = shared.load();

        let result = shared.update(|c| c.buffer_capacity = 7);
        assert!(result.is_err());
        assert_eq!(*shared.load(), *before);
    }
}
