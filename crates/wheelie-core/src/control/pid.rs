//! PID controller
//!
//! A timestamp-driven PID (Proportional-Integral-Derivative) regulator with
//! integral windup protection. Output saturation is deliberately left to the
//! caller: the balance loop shapes the command (minimum-drive floor, clamp)
//! after the regulator runs.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::math::elapsed_secs_floored;

/// Fallback integral bound used when `ki` is zero
///
/// With `ki = 0` the usual `max_output / (2 * ki)` bound is undefined, and
/// the accumulator still has to stay finite for a later gain change.
pub const FALLBACK_INTEGRAL_LIMIT: f64 = 1000.0;

/// PID controller configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Target value the measurement is regulated toward
    pub setpoint: f64,
    /// Integral windup limit (f64::INFINITY for no limit)
    pub integral_limit: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            setpoint: 0.0,
            integral_limit: f64::INFINITY,
        }
    }
}

impl PidConfig {
    /// Create a new PID config with given gains
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self {
            kp,
            ki,
            kd,
            ..Default::default()
        }
    }

    /// Create a P-only controller
    pub fn p(kp: f64) -> Self {
        Self::new(kp, 0.0, 0.0)
    }

    /// Create a PI controller
    pub fn pi(kp: f64, ki: f64) -> Self {
        Self::new(kp, ki, 0.0)
    }

    /// Create a PD controller
    pub fn pd(kp: f64, kd: f64) -> Self {
        Self::new(kp, 0.0, kd)
    }

    /// Set the setpoint
    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.setpoint = setpoint;
        self
    }

    /// Set the integral windup limit
    pub fn with_integral_limit(mut self, limit: f64) -> Self {
        self.integral_limit = limit;
        self
    }

    /// Anti-windup bound for a saturating output stage
    ///
    /// `max_output / (2 * ki)` caps the integral contribution at half the
    /// output ceiling; for `ki = 0` it falls back to
    /// [`FALLBACK_INTEGRAL_LIMIT`].
    pub fn anti_windup_limit(max_output: f64, ki: f64) -> f64 {
        if ki != 0.0 {
            (max_output / (2.0 * ki)).abs()
        } else {
            FALLBACK_INTEGRAL_LIMIT
        }
    }
}

/// PID controller internal state
///
/// `integral` and `last_error` are updated exactly once per [`Pid::update`]
/// call; suppressed ticks (deadband, fallen) leave them untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PidState {
    /// Accumulated error·time, clamped to the windup limit
    pub integral: f64,
    /// Previous error for derivative calculation
    pub last_error: f64,
    /// Proportional term of the last update
    pub p_term: f64,
    /// Integral term of the last update
    pub i_term: f64,
    /// Derivative term of the last update
    pub d_term: f64,
}

/// PID controller
///
/// # Example
/// ```
/// use wheelie_core::PidConfig;
/// use wheelie_core::Pid;
/// use std::time::{Duration, Instant};
///
/// let t0 = Instant::now();
/// let config = PidConfig::new(40.0, 0.5, 1.5)
///     .with_integral_limit(PidConfig::anti_windup_limit(65535.0, 0.5));
/// let mut pid = Pid::new(config, t0);
///
/// let output = pid.update(10.0, t0 + Duration::from_millis(5));
/// assert!(output < 0.0); // measurement above setpoint drives negative
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Pid {
    config: PidConfig,
    state: PidState,
    last_update: Instant,
}

impl Pid {
    /// Create a new PID controller
    ///
    /// `now` is a fresh monotonic timestamp; the first `update` integrates
    /// from here.
    pub fn new(config: PidConfig, now: Instant) -> Self {
        Self {
            config,
            state: PidState::default(),
            last_update: now,
        }
    }

    /// Update the controller with a new measurement and return the raw output
    ///
    /// The output is **not** saturated; clamping is the caller's
    /// responsibility. Non-positive time deltas are floored to 1 ms.
    pub fn update(&mut self, measurement: f64, now: Instant) -> f64 {
        let dt = elapsed_secs_floored(self.last_update, now);
        let error = self.config.setpoint - measurement;

        self.state.p_term = self.config.kp * error;

        // Integral term with windup protection (FMA)
        self.state.integral = error.mul_add(dt, self.state.integral).clamp(
            -self.config.integral_limit,
            self.config.integral_limit,
        );
        self.state.i_term = self.config.ki * self.state.integral;

        let derivative = (error - self.state.last_error) / dt;
        self.state.d_term = self.config.kd * derivative;

        self.state.last_error = error;
        self.last_update = now;

        self.state.p_term + self.state.i_term + self.state.d_term
    }

    /// Reset the controller state
    ///
    /// Zeroes the accumulator and error memory and resyncs the timestamp.
    /// Intended for use when control authority is handed back after a long
    /// suppression; the balance loop itself does not call this on state
    /// transitions, so resumption is smooth but carries the pre-suppression
    /// integral and a stale timestamp.
    pub fn reset(&mut self, now: Instant) {
        self.state = PidState::default();
        self.last_update = now;
    }

    /// Get the current state (terms are from the most recent update)
    pub fn state(&self) -> &PidState {
        &self.state
    }

    /// Get the configuration
    pub fn config(&self) -> &PidConfig {
        &self.config
    }
}
