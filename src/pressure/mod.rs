/*!
 * Backpressure
 * Load observation, pressure classification, and scaling directives
 */

mod controller;
mod latency;
pub mod memory;

pub use controller::{
    classify, recommend, BackpressureController, ControllerHandle, PressureLevel, PressureSample,
    ScalingAction,
};
pub use latency::LatencyTracker;
