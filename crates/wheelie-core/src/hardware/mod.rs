//! Hardware abstraction
//!
//! Traits for the IMU and the motor driver so the balance core runs against
//! real hardware, mocks, or the pendulum simulation unchanged.

mod traits;

pub use traits::{ImuSample, ImuSensor, MockImu, MockMotors, MotorDriver, Wheel};
