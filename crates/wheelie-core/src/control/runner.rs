//! Fixed-rate balance loop
//!
//! Runs the balancer against real or mocked hardware at the configured
//! cadence: read, decide, actuate, sleep the remainder of the period.
//! Cancellation comes from an external flag; the motors are guaranteed to
//! receive a final brake on every exit path, including panics and fatal
//! actuator errors.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::control::{BalanceConfig, BalanceState, Balancer};
use crate::hardware::{ImuSensor, MotorDriver};
use crate::telemetry::{NullSink, TickSink};
use crate::{Error, Result};

/// Timing and fault counters for a balance loop
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStats {
    /// Completed ticks, including braked and faulted ones
    pub ticks: u64,
    /// Ticks whose execution time exceeded the period
    pub overruns: u64,
    /// Ticks where the IMU read failed or returned implausible data
    pub sensor_faults: u64,
    /// Ticks that commanded a brake instead of drive
    pub brake_ticks: u64,
    /// Total time spent executing (excludes the period sleep)
    pub total_execution: Duration,
    /// Fastest tick
    pub min_tick: Duration,
    /// Slowest tick
    pub max_tick: Duration,
    /// Most recent tick
    pub last_tick: Duration,
}

impl LoopStats {
    fn record(&mut self, execution: Duration, period: Duration) {
        self.ticks += 1;
        self.total_execution += execution;
        self.last_tick = execution;

        if self.ticks == 1 {
            self.min_tick = execution;
            self.max_tick = execution;
        } else {
            self.min_tick = self.min_tick.min(execution);
            self.max_tick = self.max_tick.max(execution);
        }

        if execution > period {
            self.overruns += 1;
        }
    }

    /// Average tick execution time
    pub fn avg_tick(&self) -> Duration {
        if self.ticks == 0 {
            Duration::ZERO
        } else {
            self.total_execution.div_f64(self.ticks as f64)
        }
    }

    /// Fraction of ticks that overran the period (0.0 to 1.0)
    pub fn overrun_ratio(&self) -> f64 {
        if self.ticks == 0 {
            0.0
        } else {
            self.overruns as f64 / self.ticks as f64
        }
    }
}

/// Brakes the motors when dropped
///
/// Scoped acquisition of actuator control: constructed at loop entry so that
/// normal termination, cancellation and fatal errors all end with a brake
/// attempt, independent of how cancellation was delivered.
struct BrakeGuard<'a, M: MotorDriver> {
    motors: &'a mut M,
}

impl<M: MotorDriver> Drop for BrakeGuard<'_, M> {
    fn drop(&mut self) {
        if let Err(e) = self.motors.brake() {
            tracing::error!("final brake failed: {}", e);
        }
    }
}

/// A fixed-rate balance control loop
///
/// Single-threaded and cooperative: sensor reads and motor writes are
/// synchronous calls inside the tick, and the loop sleeps whatever remains
/// of the period afterwards. Overruns are counted and warned, not
/// compensated.
///
/// # Example
/// ```no_run
/// use wheelie_core::{BalanceConfig, BalanceLoop};
/// use wheelie_core::sim::PendulumSim;
///
/// let sim = PendulumSim::new(5.0);
/// let motors = sim.motor_handle();
/// let handle = BalanceLoop::new(BalanceConfig::default(), sim, motors)
///     .unwrap()
///     .spawn();
///
/// // ... later
/// handle.stop();
/// let stats = handle.join().unwrap();
/// println!("ran {} ticks", stats.ticks);
/// ```
pub struct BalanceLoop<I, M, S = NullSink> {
    balancer: Balancer,
    imu: I,
    motors: M,
    sink: S,
    period: Duration,
}

impl<I: ImuSensor, M: MotorDriver> BalanceLoop<I, M> {
    /// Create a loop with no telemetry sink
    pub fn new(config: BalanceConfig, imu: I, motors: M) -> Result<Self> {
        Self::with_sink(config, imu, motors, NullSink)
    }
}

impl<I: ImuSensor, M: MotorDriver, S: TickSink> BalanceLoop<I, M, S> {
    /// Create a loop that reports every tick to `sink`
    pub fn with_sink(config: BalanceConfig, imu: I, motors: M, sink: S) -> Result<Self> {
        let period = config.loop_period;
        let balancer = Balancer::new(config, Instant::now())?;
        Ok(Self {
            balancer,
            imu,
            motors,
            sink,
            period,
        })
    }

    /// Run on the current thread until `running` is cleared
    ///
    /// Returns the accumulated stats on a clean stop. Sensor faults brake
    /// for one tick and retry; an actuator write failure is fatal and
    /// surfaces as [`Error::Actuator`] after a final brake attempt.
    pub fn run(self, running: &AtomicBool) -> Result<LoopStats> {
        self.run_inner(running, None)
    }

    /// Run on a new thread and return a handle to it
    pub fn spawn(self) -> LoopHandle
    where
        I: 'static,
        M: 'static,
        S: 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(Mutex::new(LoopStats::default()));

        let running_clone = Arc::clone(&running);
        let stats_clone = Arc::clone(&stats);
        let thread = thread::spawn(move || self.run_inner(&running_clone, Some(&stats_clone)));

        LoopHandle {
            running,
            stats,
            thread: Some(thread),
        }
    }

    fn run_inner(
        mut self,
        running: &AtomicBool,
        shared_stats: Option<&Mutex<LoopStats>>,
    ) -> Result<LoopStats> {
        let mut stats = LoopStats::default();
        let mut prev_state: Option<BalanceState> = None;
        let mut guard = BrakeGuard {
            motors: &mut self.motors,
        };

        while running.load(Ordering::Relaxed) {
            let tick_start = Instant::now();

            let sample = match self.imu.read() {
                Ok(sample) if sample.is_finite() => Some(sample),
                Ok(sample) => {
                    tracing::warn!(?sample, "implausible IMU sample, braking for this tick");
                    None
                }
                Err(e) => {
                    tracing::warn!("IMU read failed, braking for this tick: {}", e);
                    None
                }
            };

            let duty = match sample {
                Some(sample) => {
                    let event = self.balancer.tick(&sample, tick_start);
                    if prev_state != Some(event.state) {
                        tracing::debug!(state = %event.state, angle_deg = event.angle_deg, "state change");
                        prev_state = Some(event.state);
                    }
                    self.sink.record(&event);
                    event.state.drives().then_some(event.output)
                }
                None => {
                    stats.sensor_faults += 1;
                    None
                }
            };

            let actuation = match duty {
                Some(duty) => guard.motors.set_both(duty),
                None => {
                    stats.brake_ticks += 1;
                    guard.motors.brake()
                }
            };
            if let Err(e) = actuation {
                tracing::error!("actuator write failed, stopping: {}", e);
                running.store(false, Ordering::Relaxed);
                return Err(e);
            }

            let execution = tick_start.elapsed();
            stats.record(execution, self.period);
            if let Some(shared) = shared_stats {
                *shared.lock() = stats;
            }

            if let Some(sleep_time) = self.period.checked_sub(execution) {
                thread::sleep(sleep_time);
            } else {
                tracing::warn!("tick overrun by {:?}", execution - self.period);
            }
        }

        running.store(false, Ordering::Relaxed);
        tracing::debug!(ticks = stats.ticks, "balance loop stopped");
        Ok(stats)
    }
}

/// Handle to a balance loop running on its own thread
pub struct LoopHandle {
    running: Arc<AtomicBool>,
    stats: Arc<Mutex<LoopStats>>,
    thread: Option<JoinHandle<Result<LoopStats>>>,
}

impl LoopHandle {
    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Snapshot the current statistics
    pub fn stats(&self) -> LoopStats {
        *self.stats.lock()
    }

    /// Ask the loop to stop after its current tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Stop and wait for the loop to finish
    pub fn join(mut self) -> Result<LoopStats> {
        self.stop();
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| Error::ControlLoop("balance thread panicked".into()))?,
            None => Err(Error::ControlLoop("loop already joined".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{ImuSample, MockImu, MockMotors};

    /// Accel-only sample at a fixed tilt; the default gyro-heavy filter would
    /// converge too slowly for millisecond-scale tests
    fn sample_at(angle_deg: f64) -> ImuSample {
        let rad = angle_deg.to_radians();
        ImuSample::new([9.81 * rad.cos(), 0.0, 9.81 * rad.sin()], [0.0; 3])
    }

    fn fast_config() -> BalanceConfig {
        BalanceConfig::default()
            .accel_only()
            .with_loop_period(Duration::from_millis(1))
    }

    #[test]
    fn test_cancelled_loop_exits_and_brakes() {
        let motors = MockMotors::new();
        let imu = MockImu::steady(sample_at(0.0));
        let bl = BalanceLoop::new(fast_config(), imu, motors.clone()).unwrap();

        let running = AtomicBool::new(false);
        let stats = bl.run(&running).unwrap();

        assert_eq!(stats.ticks, 0);
        // The scope guard still braked on the way out
        let log = motors.log();
        assert!(log.braked);
        assert_eq!(log.brake_count, 1);
    }

    #[test]
    fn test_sensor_faults_brake_and_resume() {
        let motors = MockMotors::new();
        let mut imu = MockImu::steady(sample_at(10.0));
        imu.fail_next(3);
        let handle = BalanceLoop::new(fast_config(), imu, motors.clone())
            .unwrap()
            .spawn();

        thread::sleep(Duration::from_millis(50));
        handle.stop();
        let stats = handle.join().unwrap();

        assert_eq!(stats.sensor_faults, 3);
        assert!(stats.ticks > 3);
        // Recovered ticks at 10° drive the wheels backward-of-lean
        let log = motors.log();
        assert!(log.drive_count > 0);
        assert!(log.braked); // final brake from the guard
    }

    #[test]
    fn test_implausible_sample_counts_as_fault() {
        let motors = MockMotors::new();
        let imu = MockImu::from_samples([
            ImuSample::new([f64::NAN, 0.0, 0.0], [0.0; 3]),
            sample_at(0.0),
        ]);
        let handle = BalanceLoop::new(fast_config(), imu, motors.clone())
            .unwrap()
            .spawn();

        thread::sleep(Duration::from_millis(30));
        handle.stop();
        let stats = handle.join().unwrap();

        assert_eq!(stats.sensor_faults, 1);
        assert!(stats.brake_ticks >= stats.ticks); // deadband afterwards
    }

    #[test]
    fn test_actuator_failure_is_fatal() {
        let motors = MockMotors::new();
        motors.set_fail(true);
        let imu = MockImu::steady(sample_at(10.0));
        let bl = BalanceLoop::new(fast_config(), imu, motors.clone()).unwrap();

        let running = AtomicBool::new(true);
        let err = bl.run(&running).unwrap_err();
        assert!(matches!(err, Error::Actuator(_)));
        // Loop marked itself stopped for observers
        assert!(!running.load(Ordering::Relaxed));
    }

    #[test]
    fn test_spawn_stop_join() {
        let motors = MockMotors::new();
        let imu = MockImu::steady(sample_at(0.0));
        let handle = BalanceLoop::new(fast_config(), imu, motors.clone())
            .unwrap()
            .spawn();

        assert!(handle.is_running());
        thread::sleep(Duration::from_millis(30));
        assert!(handle.stats().ticks > 0);

        handle.stop();
        let stats = handle.join().unwrap();
        assert!(stats.ticks > 0);
        // Upright the whole time: every tick braked, plus the exit brake
        assert_eq!(stats.brake_ticks, stats.ticks);
        assert!(motors.log().brake_count > stats.ticks);
    }

    #[test]
    fn test_loop_reports_telemetry() {
        use crate::telemetry::ChannelSink;

        let (sink, rx) = ChannelSink::bounded(1024);
        let motors = MockMotors::new();
        let imu = MockImu::steady(sample_at(10.0));
        let handle = BalanceLoop::with_sink(fast_config(), imu, motors, sink)
            .unwrap()
            .spawn();

        thread::sleep(Duration::from_millis(30));
        handle.stop();
        handle.join().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.len() > 1);
        assert!(events.iter().all(|e| e.state == BalanceState::Running));
        // Held at 10°: steady-state ticks floor to the friction minimum.
        // The first tick is excluded - its derivative kick depends on the
        // spawn latency.
        for e in &events[1..] {
            assert_eq!(e.output, -8000.0);
        }
    }

    #[test]
    fn test_stats_accounting() {
        let mut stats = LoopStats::default();
        let period = Duration::from_millis(5);
        stats.record(Duration::from_millis(1), period);
        stats.record(Duration::from_millis(3), period);
        stats.record(Duration::from_millis(8), period);

        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.overruns, 1);
        assert_eq!(stats.min_tick, Duration::from_millis(1));
        assert_eq!(stats.max_tick, Duration::from_millis(8));
        assert_eq!(stats.avg_tick(), Duration::from_millis(4));
        assert!((stats.overrun_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }
}
