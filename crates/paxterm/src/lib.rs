//! paxterm: an interactive KISS/AX.25 packet terminal.
//!
//! The binary wires four layers together: the KISS TCP transport
//! (`paxterm-tnc`), the AX.25 codec (`paxterm-core`), the LAPB link machine
//! (`paxterm-link`), and the session dispatcher in this crate that couples
//! them to a line-oriented terminal.

pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod session_log;
pub mod terminal;

pub use cli::Cli;
pub use config::TermConfig;
pub use error::TermError;
pub use session::{ExitReason, Session, Settings};
pub use terminal::{SessionStatus, StdioTerminal, Terminal};
