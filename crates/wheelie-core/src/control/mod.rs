//! Control systems for the balance bot
//!
//! The PID regulator, the balance decision logic, and the fixed-rate loop
//! that ties estimation, regulation and actuation together.

mod balance;
mod pid;
mod runner;

pub use balance::{BalanceConfig, BalanceState, Balancer};
pub use pid::{Pid, PidConfig, PidState, FALLBACK_INTEGRAL_LIMIT};
pub use runner::{BalanceLoop, LoopHandle, LoopStats};
