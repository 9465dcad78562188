//! wheelie-core: control core for a two-wheeled self-balancing robot
//!
//! Fuses accelerometer and gyroscope readings into a fore-aft tilt estimate,
//! regulates it with a PID controller, and turns the result into safe
//! differential-drive duty commands at a fixed loop rate.
//!
//! # Modules
//!
//! - [`math`] - Tilt estimation (complementary filter)
//! - [`control`] - PID controller, balance state machine, fixed-rate loop
//! - [`hardware`] - IMU and motor-driver abstraction traits plus test mocks
//! - [`telemetry`] - Per-tick structured events and non-blocking sinks
//! - [`sim`] - Inverted-pendulum backend for closed-loop testing
//!
//! # Architecture
//!
//! ```text
//! ImuSensor ──► TiltEstimator ──► BalanceState ──► Pid ──► output shaping ──► MotorDriver
//!                                 (per tick)     (running
//!                                                 only)
//! ```
//!
//! The estimator and PID controller are pure-state components; [`control::Balancer`]
//! composes them and owns the safety policy, and [`control::BalanceLoop`] drives
//! the whole thing against real or mocked hardware.

#![warn(unused_must_use)]

pub mod control;
pub mod hardware;
pub mod math;
#[cfg(feature = "sim")]
pub mod sim;
pub mod telemetry;

// Re-exports for convenience
pub use control::{
    BalanceConfig, BalanceLoop, BalanceState, Balancer, LoopHandle, LoopStats, Pid, PidConfig,
};
pub use hardware::{ImuSample, ImuSensor, MotorDriver, Wheel};
pub use math::TiltEstimator;
#[cfg(feature = "sim")]
pub use sim::PendulumSim;
pub use telemetry::{NullSink, TickEvent, TickSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for wheelie-core
///
/// All errors should be handled appropriately. Use pattern matching to handle
/// specific error cases, or use `?` to propagate errors.
///
/// Sensor errors are recoverable per tick (the loop brakes and retries);
/// actuator errors are fatal because safe operation cannot be guaranteed
/// without actuation.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors must be handled or explicitly ignored with let _ = ..."]
#[non_exhaustive]
pub enum Error {
    /// IMU read failed or returned implausible data.
    /// Handle by: braking for this tick and retrying on the next one.
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Motor driver rejected a command.
    /// Handle by: stopping the loop; a final brake is attempted on exit.
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Invalid configuration parameter.
    /// Handle by: validating config before constructing the loop.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control loop timing or execution error.
    /// Handle by: checking system load, reducing the loop rate.
    #[error("Control loop error: {0}")]
    ControlLoop(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Sensor(format!("I/O error: {}", e))
    }
}

/// Result type alias for wheelie-core operations
pub type Result<T> = std::result::Result<T, Error>;
