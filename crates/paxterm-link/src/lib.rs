//! The LAPB-style AX.25 connected-mode engine.
//!
//! [`LinkMachine`] is deliberately decoupled from I/O: every input is a
//! method call carrying the current `Instant`, every output is a list of
//! [`LinkAction`]s for the caller to act on (frames to transmit, payloads to
//! deliver, status to surface). Timers are deadlines the caller sleeps on;
//! nothing in this crate touches a socket or a clock.

pub mod config;
pub mod machine;
pub mod seq;
pub mod timer;

pub use config::LinkConfig;
pub use machine::{LinkAction, LinkMachine, LinkSnapshot, LinkStatus};
