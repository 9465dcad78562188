//! Per-tick telemetry
//!
//! The balance loop emits one structured [`TickEvent`] per tick to a
//! [`TickSink`]. Sinks are for diagnostics only and must not block: a sink
//! that stalls would stall the control loop with it.

use serde::{Deserialize, Serialize};

use crate::control::BalanceState;

/// Structured snapshot of one control tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
    /// Tilt estimate after this tick's sensor fusion, degrees
    pub angle_deg: f64,
    /// Setpoint minus angle, degrees
    pub error_deg: f64,
    /// Proportional term (zero when the PID was not advanced)
    pub p_term: f64,
    /// Integral term (zero when the PID was not advanced)
    pub i_term: f64,
    /// Derivative term (zero when the PID was not advanced)
    pub d_term: f64,
    /// Final shaped duty sent to both wheels; zero in deadband/fallen
    pub output: f64,
    /// State the tick was classified into
    pub state: BalanceState,
}

/// Sink for per-tick telemetry
///
/// `record` runs on the control thread between actuation and the period
/// sleep. Implementations must return promptly - buffer, drop, or hand off,
/// never wait.
pub trait TickSink: Send {
    /// Record one tick
    fn record(&mut self, event: &TickEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TickSink for NullSink {
    #[inline]
    fn record(&mut self, _event: &TickEvent) {}
}

/// Emits each tick as a `tracing` trace event
///
/// Useful during tuning with a subscriber filtered to this target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceSink;

impl TickSink for TraceSink {
    fn record(&mut self, event: &TickEvent) {
        tracing::trace!(
            target: "wheelie_core::tick",
            angle_deg = event.angle_deg,
            error_deg = event.error_deg,
            p = event.p_term,
            i = event.i_term,
            d = event.d_term,
            output = event.output,
            state = %event.state,
            "tick"
        );
    }
}

/// Hands events to a consumer thread over a bounded channel
///
/// Uses `try_send` so a slow consumer never back-pressures the control loop;
/// events that don't fit are dropped and counted instead.
#[derive(Debug)]
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<TickEvent>,
    dropped: u64,
}

impl ChannelSink {
    /// Create a sink and its receiving half with the given buffer capacity
    pub fn bounded(capacity: usize) -> (Self, crossbeam_channel::Receiver<TickEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    /// Number of events dropped because the consumer lagged
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TickSink for ChannelSink {
    fn record(&mut self, event: &TickEvent) {
        if self.tx.try_send(*event).is_err() {
            self.dropped += 1;
        }
    }
}
