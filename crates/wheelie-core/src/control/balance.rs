//! Balance decision logic
//!
//! Composes the tilt estimator and PID regulator, classifies each tick into
//! an explicit safety state, and shapes the raw regulator output into a safe
//! duty command.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::control::pid::{Pid, PidConfig};
use crate::hardware::ImuSample;
use crate::math::TiltEstimator;
use crate::telemetry::TickEvent;
use crate::{Error, Result};

/// Tuning and safety configuration for the balance core
///
/// Immutable for the process lifetime; constructed once and handed to
/// [`Balancer::new`]. Defaults are a conservative starting point for a small
/// two-wheeled bot with 16-bit PWM drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Balance setpoint in degrees from vertical
    pub target_angle_deg: f64,
    /// Output ceiling (full-scale duty)
    pub max_pwm: f64,
    /// Minimum drive that actually turns the wheels (static friction floor)
    pub min_pwm: f64,
    /// Zero-output band around the setpoint, degrees
    pub deadband_deg: f64,
    /// Tilt beyond which the bot has fallen and drive is cut, degrees
    pub max_angle_deg: f64,
    /// Gyro/accel blend for the tilt estimator
    pub complementary_alpha: f64,
    /// Fuse gyro and accel; when false the raw accel angle is used
    pub fuse_gyro: bool,
    /// Target tick interval
    pub loop_period: Duration,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            kp: 40.0,
            ki: 0.5,
            kd: 1.5,
            target_angle_deg: 0.0,
            max_pwm: 65535.0,
            min_pwm: 8000.0,
            deadband_deg: 3.0,
            max_angle_deg: 45.0,
            complementary_alpha: 0.98,
            fuse_gyro: true,
            loop_period: Duration::from_millis(5),
        }
    }
}

impl BalanceConfig {
    /// Set the PID gains
    pub fn with_gains(mut self, kp: f64, ki: f64, kd: f64) -> Self {
        self.kp = kp;
        self.ki = ki;
        self.kd = kd;
        self
    }

    /// Set the balance setpoint in degrees
    pub fn with_target_angle(mut self, deg: f64) -> Self {
        self.target_angle_deg = deg;
        self
    }

    /// Set the output ceiling and friction floor
    pub fn with_pwm_range(mut self, min_pwm: f64, max_pwm: f64) -> Self {
        self.min_pwm = min_pwm;
        self.max_pwm = max_pwm;
        self
    }

    /// Set the deadband width in degrees
    pub fn with_deadband(mut self, deg: f64) -> Self {
        self.deadband_deg = deg;
        self
    }

    /// Set the fall threshold in degrees
    pub fn with_max_angle(mut self, deg: f64) -> Self {
        self.max_angle_deg = deg;
        self
    }

    /// Set the tick interval
    pub fn with_loop_period(mut self, period: Duration) -> Self {
        self.loop_period = period;
        self
    }

    /// Disable gyro fusion (accelerometer-only estimation)
    pub fn accel_only(mut self) -> Self {
        self.fuse_gyro = false;
        self
    }

    /// Target loop rate in Hz
    pub fn loop_rate_hz(&self) -> f64 {
        1.0 / self.loop_period.as_secs_f64()
    }

    /// Integral bound derived from the output ceiling (anti-windup)
    pub fn integral_limit(&self) -> f64 {
        PidConfig::anti_windup_limit(self.max_pwm, self.ki)
    }

    /// PID configuration implied by this balance config
    pub fn pid_config(&self) -> PidConfig {
        PidConfig::new(self.kp, self.ki, self.kd)
            .with_setpoint(self.target_angle_deg)
            .with_integral_limit(self.integral_limit())
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite()) {
            return Err(Error::Config("gains must be finite".into()));
        }
        if !self.max_pwm.is_finite() || self.max_pwm <= 0.0 {
            return Err(Error::Config(format!(
                "max_pwm must be positive, got {}",
                self.max_pwm
            )));
        }
        if !(0.0..=self.max_pwm).contains(&self.min_pwm) {
            return Err(Error::Config(format!(
                "min_pwm must be within [0, max_pwm], got {}",
                self.min_pwm
            )));
        }
        if self.deadband_deg < 0.0 {
            return Err(Error::Config(format!(
                "deadband_deg must be non-negative, got {}",
                self.deadband_deg
            )));
        }
        if self.max_angle_deg <= 0.0 {
            return Err(Error::Config(format!(
                "max_angle_deg must be positive, got {}",
                self.max_angle_deg
            )));
        }
        if !(0.0..=1.0).contains(&self.complementary_alpha) {
            return Err(Error::Config(format!(
                "complementary_alpha must be within [0, 1], got {}",
                self.complementary_alpha
            )));
        }
        if self.loop_period.is_zero() {
            return Err(Error::Config("loop_period must be non-zero".into()));
        }
        Ok(())
    }
}

/// Logical state of the balance loop, derived fresh from the angle each tick
///
/// This is not persisted memory: every tick reclassifies from the estimator
/// output, so `Fallen` self-exits as soon as the bot is stood back up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceState {
    /// Actively regulating: PID runs and the shaped output drives the wheels
    Running,
    /// Close enough to the setpoint that drive would only chatter
    Deadband,
    /// Tilted past the safety threshold; drive is cut until upright again
    Fallen,
}

impl BalanceState {
    /// Classify an angle against the config thresholds
    ///
    /// Fall detection wins over the deadband check.
    #[inline]
    pub fn classify(angle_deg: f64, config: &BalanceConfig) -> Self {
        if angle_deg.abs() > config.max_angle_deg {
            Self::Fallen
        } else if (angle_deg - config.target_angle_deg).abs() < config.deadband_deg {
            Self::Deadband
        } else {
            Self::Running
        }
    }

    /// Whether this state drives the motors
    #[inline]
    pub fn drives(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl std::fmt::Display for BalanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Deadband => write!(f, "deadband"),
            Self::Fallen => write!(f, "fallen"),
        }
    }
}

/// One-tick balance decision engine
///
/// Owns the tilt estimator and PID regulator; pure with respect to I/O so it
/// can be tested without hardware. [`crate::control::BalanceLoop`] feeds it
/// samples and actuates the result.
#[derive(Debug, Clone)]
pub struct Balancer {
    config: BalanceConfig,
    estimator: TiltEstimator,
    pid: Pid,
}

impl Balancer {
    /// Create a balancer from a validated config
    ///
    /// `now` is a fresh monotonic timestamp shared by the estimator and PID.
    pub fn new(config: BalanceConfig, now: Instant) -> Result<Self> {
        config.validate()?;
        let estimator = if config.fuse_gyro {
            TiltEstimator::new(config.complementary_alpha, now)
        } else {
            TiltEstimator::accel_only(now)
        };
        let pid = Pid::new(config.pid_config(), now);
        Ok(Self {
            config,
            estimator,
            pid,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Get the PID regulator (state inspection)
    pub fn pid(&self) -> &Pid {
        &self.pid
    }

    /// Get the current tilt estimate in degrees
    pub fn angle_deg(&self) -> f64 {
        self.estimator.angle_deg()
    }

    /// Run one control tick: estimate, classify, regulate, shape
    ///
    /// In `Deadband` and `Fallen` the PID is not advanced at all - its error
    /// memory and timestamp stay stale, so a later `Running` tick resumes
    /// from the pre-suppression state. The returned event's `output` is the
    /// final shaped duty (zero for the non-driving states).
    pub fn tick(&mut self, sample: &ImuSample, now: Instant) -> TickEvent {
        let angle_deg = self.estimator.update(
            sample.accel[0],
            sample.accel[2],
            sample.gyro[1],
            now,
        );
        let state = BalanceState::classify(angle_deg, &self.config);
        let error_deg = self.config.target_angle_deg - angle_deg;

        if !state.drives() {
            return TickEvent {
                angle_deg,
                error_deg,
                p_term: 0.0,
                i_term: 0.0,
                d_term: 0.0,
                output: 0.0,
                state,
            };
        }

        let raw = self.pid.update(angle_deg, now);
        let terms = self.pid.state();
        TickEvent {
            angle_deg,
            error_deg,
            p_term: terms.p_term,
            i_term: terms.i_term,
            d_term: terms.d_term,
            output: self.shape(raw),
            state,
        }
    }

    /// Minimum-drive floor, then saturation
    ///
    /// A nonzero command below `min_pwm` would stall against static friction,
    /// so it is raised to the floor with its sign preserved before clamping
    /// to the PWM range.
    fn shape(&self, raw: f64) -> f64 {
        let floored = if raw != 0.0 && raw.abs() < self.config.min_pwm {
            self.config.min_pwm.copysign(raw)
        } else {
            raw
        };
        floored.clamp(-self.config.max_pwm, self.config.max_pwm)
    }
}
