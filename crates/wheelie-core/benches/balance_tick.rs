//! Benchmarks for the balance hot path
//!
//! Run with: cargo bench --bench balance_tick

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::{Duration, Instant};

use wheelie_core::hardware::ImuSample;
use wheelie_core::{BalanceConfig, Balancer, Pid, PidConfig, TiltEstimator};

const PERIOD: Duration = Duration::from_millis(5);

fn sample_at(angle_deg: f64) -> ImuSample {
    let rad = angle_deg.to_radians();
    ImuSample::new([9.81 * rad.cos(), 0.0, 9.81 * rad.sin()], [0.02, 0.01, 0.0])
}

fn bench_pid_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("PID");

    group.bench_function("P controller update", |b| {
        let t0 = Instant::now();
        let mut pid = Pid::new(PidConfig::p(40.0), t0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(pid.update(5.0, now))
        })
    });

    group.bench_function("full PID update", |b| {
        let t0 = Instant::now();
        let config = PidConfig::new(40.0, 0.5, 1.5)
            .with_integral_limit(PidConfig::anti_windup_limit(65535.0, 0.5));
        let mut pid = Pid::new(config, t0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(pid.update(5.0, now))
        })
    });

    group.finish();
}

fn bench_estimator(c: &mut Criterion) {
    let mut group = c.benchmark_group("Tilt Estimator");

    group.bench_function("complementary update", |b| {
        let t0 = Instant::now();
        let mut est = TiltEstimator::new(0.98, t0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(est.update(9.7, 0.4, 0.02, now))
        })
    });

    group.bench_function("accel-only update", |b| {
        let t0 = Instant::now();
        let mut est = TiltEstimator::accel_only(t0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(est.update(9.7, 0.4, 0.02, now))
        })
    });

    group.finish();
}

fn bench_full_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("Full Balance Tick");

    // One 200 Hz tick: fuse the sample, classify, regulate, shape
    group.bench_function("running tick", |b| {
        let t0 = Instant::now();
        let mut balancer = Balancer::new(BalanceConfig::default(), t0).unwrap();
        let sample = sample_at(10.0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(balancer.tick(&sample, now))
        })
    });

    group.bench_function("deadband tick", |b| {
        let t0 = Instant::now();
        let mut balancer = Balancer::new(BalanceConfig::default(), t0).unwrap();
        let sample = sample_at(0.0);
        let mut now = t0;
        b.iter(|| {
            now += PERIOD;
            black_box(balancer.tick(&sample, now))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pid_update, bench_estimator, bench_full_tick);
criterion_main!(benches);
