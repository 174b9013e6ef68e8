//! Top-level error type for the terminal binary.

use paxterm_tnc::TncError;

#[derive(Debug, thiserror::Error)]
pub enum TermError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("argument error: {0}")]
    Argument(String),

    #[error("transport error: {0}")]
    Transport(#[from] TncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
