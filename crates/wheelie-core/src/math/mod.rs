//! Signal-level math for the balance core
//!
//! Currently a single component: the complementary-filter tilt estimator.

mod tilt;

pub use tilt::TiltEstimator;

use std::time::Instant;

/// Smallest time step the estimator and PID will integrate over, in seconds.
///
/// Non-positive deltas can show up when two ticks land on the same clock
/// reading; flooring avoids a division fault without propagating the glitch.
pub(crate) const MIN_DT_SECS: f64 = 0.001;

/// Seconds elapsed from `last` to `now`, floored to [`MIN_DT_SECS`].
#[inline]
pub(crate) fn elapsed_secs_floored(last: Instant, now: Instant) -> f64 {
    let dt = now.saturating_duration_since(last).as_secs_f64();
    if dt <= 0.0 {
        MIN_DT_SECS
    } else {
        dt
    }
}
