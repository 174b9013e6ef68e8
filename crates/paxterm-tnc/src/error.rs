//! Transport error types.

#[derive(Debug, thiserror::Error)]
pub enum TncError {
    #[error("TNC connection is down")]
    Down,

    #[error("outbound buffer full")]
    Busy,

    #[error("failed to connect to TNC at {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
