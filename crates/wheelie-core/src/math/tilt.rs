//! Complementary-filter tilt estimation
//!
//! Fuses accelerometer and gyroscope samples into a single fore-aft tilt
//! angle. Gyro integration dominates short-term (low noise, drift-prone);
//! the accelerometer angle corrects long-term drift (noisy, bias-free).

use super::elapsed_secs_floored;
use std::time::Instant;

/// Tilt-angle estimator for a near-vertical body
///
/// The accelerometer angle `atan2(accel_z, accel_x)` treats gravity as the
/// dominant acceleration, which only holds near-static or under low dynamic
/// acceleration. That is a known limitation of this estimator, not a bug.
///
/// `atan2` naturally bounds the output to `(-180°, 180°]`; no wraparound
/// handling is done because operation is assumed to stay near vertical.
///
/// # Example
/// ```
/// use wheelie_core::TiltEstimator;
/// use std::time::{Duration, Instant};
///
/// let t0 = Instant::now();
/// let mut est = TiltEstimator::new(0.98, t0);
/// let angle = est.update(9.81, 0.0, 0.0, t0 + Duration::from_millis(5));
/// assert!(angle.abs() < 1.0); // upright
/// ```
#[derive(Debug, Clone)]
pub struct TiltEstimator {
    /// Current estimate in degrees, signed, fore-aft from vertical
    angle_deg: f64,
    /// Gyro weight (0-1); accel weight is the complement
    alpha: f64,
    /// Precomputed 1.0 - alpha
    one_minus_alpha: f64,
    /// When false, the estimate is the raw accelerometer angle every update
    fuse_gyro: bool,
    last_update: Instant,
}

impl TiltEstimator {
    /// Create a fusing estimator with the given gyro weight
    ///
    /// # Arguments
    /// * `alpha` - Gyro/accel blend (0.0 to 1.0). Higher trusts the gyro more.
    /// * `now` - Fresh monotonic timestamp; the first `update` integrates from here.
    ///
    /// # Panics
    /// Panics if alpha is not in range [0, 1]
    pub fn new(alpha: f64, now: Instant) -> Self {
        assert!(
            (0.0..=1.0).contains(&alpha),
            "Alpha must be between 0 and 1"
        );
        Self {
            angle_deg: 0.0,
            alpha,
            one_minus_alpha: 1.0 - alpha,
            fuse_gyro: true,
            last_update: now,
        }
    }

    /// Create an accelerometer-only estimator (no gyro fusion)
    pub fn accel_only(now: Instant) -> Self {
        Self {
            angle_deg: 0.0,
            alpha: 0.0,
            one_minus_alpha: 1.0,
            fuse_gyro: false,
            last_update: now,
        }
    }

    /// Get the gyro weight
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Get the current estimate in degrees without updating
    pub fn angle_deg(&self) -> f64 {
        self.angle_deg
    }

    /// Fold one IMU sample into the estimate and return the new angle
    ///
    /// # Arguments
    /// * `accel_x` - Accelerometer X (vertical axis when upright), m/s² or g
    /// * `accel_z` - Accelerometer Z (fore-aft axis), same units as `accel_x`
    /// * `gyro_y` - Pitch rate around Y, rad/s
    /// * `now` - Monotonic timestamp of the sample
    ///
    /// The accel angle is scale-invariant, so accelerometer units cancel out.
    /// Non-positive time deltas are floored to 1 ms.
    pub fn update(&mut self, accel_x: f64, accel_z: f64, gyro_y: f64, now: Instant) -> f64 {
        let dt = elapsed_secs_floored(self.last_update, now);
        let accel_angle = accel_z.atan2(accel_x).to_degrees();

        self.angle_deg = if self.fuse_gyro {
            let gyro_dps = gyro_y.to_degrees();
            self.alpha.mul_add(
                gyro_dps.mul_add(dt, self.angle_deg),
                self.one_minus_alpha * accel_angle,
            )
        } else {
            accel_angle
        };

        self.last_update = now;
        self.angle_deg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    fn ticks(t0: Instant, n: u64, step_ms: u64) -> Instant {
        t0 + Duration::from_millis(n * step_ms)
    }

    #[test]
    fn test_accel_angle_upright() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::accel_only(t0);
        // Gravity entirely on X: upright
        let angle = est.update(9.81, 0.0, 0.0, ticks(t0, 1, 5));
        assert_relative_eq!(angle, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_accel_angle_45_degrees() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::accel_only(t0);
        let angle = est.update(1.0, 1.0, 0.0, ticks(t0, 1, 5));
        assert_relative_eq!(angle, 45.0, epsilon = 1e-10);
    }

    #[test]
    fn test_accel_angle_scale_invariant() {
        let t0 = Instant::now();
        let mut a = TiltEstimator::accel_only(t0);
        let mut b = TiltEstimator::accel_only(t0);
        let ax = 3.1;
        let az = 7.4;
        let one = a.update(ax, az, 0.0, ticks(t0, 1, 5));
        let scaled = b.update(2.5 * ax, 2.5 * az, 0.0, ticks(t0, 1, 5));
        assert_relative_eq!(one, scaled, epsilon = 1e-12);
    }

    #[test]
    fn test_alpha_one_is_pure_gyro_integration() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(1.0, t0);
        // 0.1 rad/s for 1 second in 10 steps; accel input is garbage on purpose
        for i in 1..=10 {
            est.update(123.0, -456.0, 0.1, ticks(t0, i, 100));
        }
        assert_relative_eq!(est.angle_deg(), 0.1_f64.to_degrees(), epsilon = 1e-9);
    }

    #[test]
    fn test_alpha_zero_is_raw_accel() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(0.0, t0);
        // Huge gyro rate must be ignored entirely
        let angle = est.update(1.0, 1.0, 99.0, ticks(t0, 1, 5));
        assert_relative_eq!(angle, 45.0, epsilon = 1e-10);
    }

    #[test]
    fn test_blend_between_gyro_and_accel() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(0.5, t0);
        // accel says 45°, gyro says hold at 0°
        let angle = est.update(1.0, 1.0, 0.0, ticks(t0, 1, 5));
        assert_relative_eq!(angle, 22.5, epsilon = 1e-10);
    }

    #[test]
    fn test_non_positive_dt_floors() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(0.98, t0);
        est.update(9.81, 0.0, 0.5, t0 + Duration::from_millis(5));
        // Same timestamp again: dt floors to 1 ms, no NaN or infinity
        let angle = est.update(9.81, 0.0, 0.5, t0 + Duration::from_millis(5));
        assert!(angle.is_finite());
    }

    #[test]
    fn test_accel_corrects_gyro_drift() {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(0.98, t0);
        // Start the estimate at a wrong value via a gyro impulse, then hold
        // still: the accel term should pull the estimate back toward zero.
        est.update(9.81, 0.0, 1.0, ticks(t0, 1, 100));
        let after_impulse = est.angle_deg();
        for i in 2..=400 {
            est.update(9.81, 0.0, 0.0, ticks(t0, i, 100));
        }
        assert!(est.angle_deg().abs() < after_impulse.abs() * 0.01);
    }

    #[test]
    #[should_panic(expected = "Alpha must be between 0 and 1")]
    fn test_alpha_out_of_range_panics() {
        let _ = TiltEstimator::new(1.5, Instant::now());
    }
}
