//! IMU and motor-driver traits plus mock implementations
//!
//! The traits model the external collaborators of the control core: a sensor
//! that produces one inertial sample per tick and a duty-cycle sink for the
//! two wheels. Both are synchronous and may block; the loop accepts that a
//! stalled transport stalls the tick.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Wheel identifier for the differential drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Wheel {
    Left,
    Right,
}

impl Wheel {
    /// Index into per-wheel arrays
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}

/// One inertial sample: accelerometer in m/s² (or any uniform scale),
/// gyroscope in rad/s
///
/// The balance core only consumes `accel[0]` (vertical when upright),
/// `accel[2]` (fore-aft) and `gyro[1]` (pitch rate); the full triples are
/// carried so richer estimators can be swapped in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuSample {
    /// Acceleration [x, y, z]
    pub accel: [f64; 3],
    /// Angular rate [x, y, z]
    pub gyro: [f64; 3],
}

impl ImuSample {
    /// Create a sample from raw triples
    pub fn new(accel: [f64; 3], gyro: [f64; 3]) -> Self {
        Self { accel, gyro }
    }

    /// Plausibility check: every component is a finite number
    ///
    /// NaN or infinite readings indicate a bus glitch; the loop treats them
    /// like a failed read.
    pub fn is_finite(&self) -> bool {
        self.accel.iter().chain(self.gyro.iter()).all(|v| v.is_finite())
    }
}

/// Source of inertial samples
pub trait ImuSensor: Send {
    /// Read one sample; blocks until the transport answers
    fn read(&mut self) -> Result<ImuSample>;
}

/// Sink for signed duty commands, one per wheel
///
/// Positive duty drives forward, negative reverse, zero brakes that wheel.
pub trait MotorDriver: Send {
    /// Set one wheel's signed duty
    fn set_duty(&mut self, wheel: Wheel, duty: f64) -> Result<()>;

    /// Brake both wheels immediately
    fn brake(&mut self) -> Result<()>;

    /// Set both wheels to the same signed duty (fore-aft balancing)
    fn set_both(&mut self, duty: f64) -> Result<()> {
        self.set_duty(Wheel::Left, duty)?;
        self.set_duty(Wheel::Right, duty)
    }
}

/// Scripted IMU for tests
///
/// Replays queued samples, then repeats the last one. Failures can be
/// injected ahead of the next reads.
#[derive(Debug, Clone)]
pub struct MockImu {
    queue: VecDeque<ImuSample>,
    last: ImuSample,
    fail_reads: usize,
}

impl MockImu {
    /// An IMU that always reports the same sample
    pub fn steady(sample: ImuSample) -> Self {
        Self {
            queue: VecDeque::new(),
            last: sample,
            fail_reads: 0,
        }
    }

    /// An IMU that replays `samples` in order, then repeats the last
    pub fn from_samples(samples: impl IntoIterator<Item = ImuSample>) -> Self {
        let queue: VecDeque<ImuSample> = samples.into_iter().collect();
        let last = queue.back().copied().unwrap_or_default();
        Self {
            queue,
            last,
            fail_reads: 0,
        }
    }

    /// Make the next `n` reads fail
    pub fn fail_next(&mut self, n: usize) {
        self.fail_reads = n;
    }
}

impl ImuSensor for MockImu {
    fn read(&mut self) -> Result<ImuSample> {
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(Error::Sensor("injected read failure".into()));
        }
        if let Some(sample) = self.queue.pop_front() {
            self.last = sample;
        }
        Ok(self.last)
    }
}

/// Snapshot of what the mock motor driver has been told to do
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorLog {
    /// Last commanded duty per wheel
    pub duties: [f64; 2],
    /// Whether the last command was a brake
    pub braked: bool,
    /// Total brake commands
    pub brake_count: u64,
    /// Total set_duty commands
    pub drive_count: u64,
}

/// Recording motor driver for tests
///
/// Cheap to clone; clones share the same log so the test can keep a handle
/// while the loop owns the other (same pattern as sharing robot state behind
/// a lock).
#[derive(Debug, Clone, Default)]
pub struct MockMotors {
    log: Arc<Mutex<MotorLog>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MockMotors {
    /// Create an idle mock driver
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the command log
    pub fn log(&self) -> MotorLog {
        *self.log.lock()
    }

    /// Make every subsequent write fail
    pub fn set_fail(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }
}

impl MotorDriver for MockMotors {
    fn set_duty(&mut self, wheel: Wheel, duty: f64) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::Actuator("injected write failure".into()));
        }
        let mut log = self.log.lock();
        log.duties[wheel.index()] = duty;
        log.braked = false;
        log.drive_count += 1;
        Ok(())
    }

    fn brake(&mut self) -> Result<()> {
        if *self.fail_writes.lock() {
            return Err(Error::Actuator("injected write failure".into()));
        }
        let mut log = self.log.lock();
        log.duties = [0.0, 0.0];
        log.braked = true;
        log.brake_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_finite_check() {
        assert!(ImuSample::new([9.81, 0.0, 0.1], [0.0; 3]).is_finite());
        assert!(!ImuSample::new([f64::NAN, 0.0, 0.0], [0.0; 3]).is_finite());
        assert!(!ImuSample::new([0.0; 3], [0.0, f64::INFINITY, 0.0]).is_finite());
    }

    #[test]
    fn test_mock_imu_replays_then_repeats() {
        let a = ImuSample::new([1.0, 0.0, 0.0], [0.0; 3]);
        let b = ImuSample::new([2.0, 0.0, 0.0], [0.0; 3]);
        let mut imu = MockImu::from_samples([a, b]);
        assert_eq!(imu.read().unwrap(), a);
        assert_eq!(imu.read().unwrap(), b);
        assert_eq!(imu.read().unwrap(), b);
    }

    #[test]
    fn test_mock_imu_fail_injection() {
        let mut imu = MockImu::steady(ImuSample::default());
        imu.fail_next(2);
        assert!(imu.read().is_err());
        assert!(imu.read().is_err());
        assert!(imu.read().is_ok());
    }

    #[test]
    fn test_mock_motors_log_shared_across_clones() {
        let motors = MockMotors::new();
        let mut handle = motors.clone();
        handle.set_both(1234.0).unwrap();
        assert_eq!(motors.log().duties, [1234.0, 1234.0]);
        assert!(!motors.log().braked);

        handle.brake().unwrap();
        let log = motors.log();
        assert!(log.braked);
        assert_eq!(log.duties, [0.0, 0.0]);
        assert_eq!(log.brake_count, 1);
    }

    #[test]
    fn test_mock_motors_fail_injection() {
        let motors = MockMotors::new();
        let mut handle = motors.clone();
        motors.set_fail(true);
        assert!(handle.set_duty(Wheel::Left, 100.0).is_err());
        assert!(handle.brake().is_err());
    }
}
