//! Inverted-pendulum test backend
//!
//! A deliberately simple fore-aft pendulum model that speaks both hardware
//! traits: it synthesizes IMU samples consistent with its tilt state and
//! accepts duty commands as wheel torque. Good enough to close the control
//! loop in tests; not a physics engine.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::hardware::{ImuSample, ImuSensor, MotorDriver, Wheel};
use crate::Result;

/// Pendulum model parameters
///
/// Tuned so the default balance gains hold the model upright: full-scale
/// duty produces roughly an order of magnitude more angular acceleration
/// than gravity at the fall threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PendulumConfig {
    /// Gravity torque coefficient: deg/s² contributed at 90° tilt
    pub gravity_gain: f64,
    /// Drive torque coefficient: deg/s² per duty count
    pub drive_gain: f64,
    /// Viscous damping (back-EMF, friction): 1/s applied to the tilt rate
    pub damping: f64,
    /// Gravity magnitude used when synthesizing accelerometer samples, m/s²
    pub gravity_mss: f64,
}

impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            gravity_gain: 500.0,
            drive_gain: 0.05,
            damping: 5.0,
            gravity_mss: 9.81,
        }
    }
}

#[derive(Debug, Default)]
struct PendulumState {
    angle_deg: f64,
    rate_dps: f64,
    duties: [f64; 2],
    braked: bool,
}

impl PendulumState {
    fn effective_duty(&self) -> f64 {
        if self.braked {
            0.0
        } else {
            (self.duties[0] + self.duties[1]) / 2.0
        }
    }
}

/// Fore-aft inverted pendulum with duty-driven wheels
///
/// Implements [`ImuSensor`]; motor commands arrive through the cloneable
/// [`PendulumMotors`] handle from [`motor_handle`](Self::motor_handle), so
/// the sensor and actuator halves can be owned by different parts of a test.
/// Time is advanced only by explicit [`step`](Self::step) calls, which keeps
/// closed-loop tests deterministic.
#[derive(Debug)]
pub struct PendulumSim {
    config: PendulumConfig,
    state: Arc<Mutex<PendulumState>>,
}

impl PendulumSim {
    /// Create a pendulum at rest at the given tilt
    pub fn new(initial_angle_deg: f64) -> Self {
        Self::with_config(initial_angle_deg, PendulumConfig::default())
    }

    /// Create with custom model parameters
    pub fn with_config(initial_angle_deg: f64, config: PendulumConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(PendulumState {
                angle_deg: initial_angle_deg,
                ..Default::default()
            })),
        }
    }

    /// Get a motor-driver handle wired to this pendulum
    pub fn motor_handle(&self) -> PendulumMotors {
        PendulumMotors {
            state: Arc::clone(&self.state),
        }
    }

    /// Current true tilt in degrees (ground truth, not the estimate)
    pub fn angle_deg(&self) -> f64 {
        self.state.lock().angle_deg
    }

    /// Current tilt rate in deg/s
    pub fn rate_dps(&self) -> f64 {
        self.state.lock().rate_dps
    }

    /// Advance the model by `dt` seconds using the last commanded duty
    ///
    /// Semi-implicit Euler: rate first, then angle.
    pub fn step(&mut self, dt: f64) {
        let mut s = self.state.lock();
        let tilt_accel = self.config.gravity_gain * s.angle_deg.to_radians().sin()
            + self.config.drive_gain * s.effective_duty()
            - self.config.damping * s.rate_dps;
        s.rate_dps += tilt_accel * dt;
        s.angle_deg += s.rate_dps * dt;
    }
}

impl ImuSensor for PendulumSim {
    /// Synthesize a sample consistent with the current tilt
    ///
    /// Gravity projects onto the body axes as `(g·cos θ, 0, g·sin θ)`, so
    /// `atan2(accel_z, accel_x)` recovers θ exactly; the pitch gyro carries
    /// the tilt rate in rad/s.
    fn read(&mut self) -> Result<ImuSample> {
        let s = self.state.lock();
        let theta = s.angle_deg.to_radians();
        Ok(ImuSample::new(
            [
                self.config.gravity_mss * theta.cos(),
                0.0,
                self.config.gravity_mss * theta.sin(),
            ],
            [0.0, s.rate_dps.to_radians(), 0.0],
        ))
    }
}

/// Motor-driver half of the pendulum
#[derive(Debug, Clone)]
pub struct PendulumMotors {
    state: Arc<Mutex<PendulumState>>,
}

impl MotorDriver for PendulumMotors {
    fn set_duty(&mut self, wheel: Wheel, duty: f64) -> Result<()> {
        let mut s = self.state.lock();
        s.duties[wheel.index()] = duty;
        s.braked = false;
        Ok(())
    }

    fn brake(&mut self) -> Result<()> {
        let mut s = self.state.lock();
        s.duties = [0.0, 0.0];
        s.braked = true;
        Ok(())
    }
}
