//! Error types for the paxterm-core codecs.

#[derive(Debug, thiserror::Error)]
pub enum CallsignError {
    #[error("callsign base must be 1-6 characters, got {0}")]
    BadLength(usize),

    #[error("callsign contains invalid character {0:?}")]
    BadCharacter(char),

    #[error("SSID must be 0-15, got {0}")]
    BadSsid(u32),

    #[error("empty callsign")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short: need at least {min} bytes, got {actual}")]
    TooShort { min: usize, actual: usize },

    #[error("address chain not terminated by extension bit")]
    UnterminatedAddressChain,

    #[error("address chain carries more than {max} digipeaters")]
    TooManyDigipeaters { max: usize },

    #[error("unrecognized control octet 0x{0:02x}")]
    InvalidControl(u8),

    #[error("invalid escape sequence 0x{0:02x}")]
    InvalidEscapeSequence(u8),

    #[error("incomplete escape sequence at end of frame")]
    IncompleteEscape,

    #[error("frame type requires a PID octet but none is present")]
    MissingPid,

    #[error("invalid callsign in address field: {0}")]
    BadAddress(#[from] CallsignError),
}
