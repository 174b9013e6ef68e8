//! Wire formats for the paxterm packet terminal.
//!
//! This crate defines the AX.25 v2.x (modulo-8) address, control, and frame
//! codecs together with the KISS byte-stuffing used between host and TNC.
//! Everything here is pure byte manipulation; sockets and link state live in
//! the `paxterm-tnc` and `paxterm-link` crates.

pub mod address;
pub mod callsign;
pub mod constants;
pub mod control;
pub mod error;
pub mod frame;
pub mod kiss;

pub use address::{AddressField, Digipeater};
pub use callsign::Callsign;
pub use control::{Control, SFrame, UFrame};
pub use error::{CallsignError, FrameError};
pub use frame::Ax25Frame;
