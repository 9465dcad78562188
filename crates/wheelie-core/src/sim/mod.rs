//! Simulation backend for testing without hardware

mod pendulum;

pub use pendulum::{PendulumConfig, PendulumMotors, PendulumSim};
