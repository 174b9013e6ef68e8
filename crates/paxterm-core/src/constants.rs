//! Shared AX.25 protocol constants (modulo-8 variant).

/// Encoded size of one address (6 shifted characters + SSID octet).
pub const ADDR_LEN: usize = 7;

/// Smallest decodable frame: destination + source addresses + control octet.
pub const MIN_FRAME_LEN: usize = 2 * ADDR_LEN + 1;

/// Maximum number of digipeaters in an address chain.
pub const MAX_DIGIPEATERS: usize = 8;

/// PID for "no layer 3" text payloads; the only PID the engine emits.
pub const PID_NO_LAYER3: u8 = 0xF0;

/// Modulus of the sequence-number space.
pub const SEQ_MODULUS: u8 = 8;

/// P/F bit position in the control octet.
pub const PF_MASK: u8 = 0x10;

// SSID octet layout.
pub const SSID_EXTENSION: u8 = 0x01;
pub const SSID_RESERVED: u8 = 0x60;
pub const SSID_CH_BIT: u8 = 0x80;
