//! KISS byte-stuffing framing.
//!
//! Frame format: `FEND <type> <escaped payload> FEND`, where `<type>` packs
//! `(port << 4) | command`. Within the payload FEND becomes FESC TFEND and
//! FESC becomes FESC TFESC. The streaming deframer lives in `paxterm-tnc`;
//! this module is the pure byte layer.

use crate::error::FrameError;

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// KISS command nibble for a data frame.
pub const CMD_DATA: u8 = 0x00;
/// TNC control commands the engine tolerates and ignores on receive.
pub const CMD_TXDELAY: u8 = 0x01;
pub const CMD_SET_HARDWARE: u8 = 0x06;

/// Escape special bytes using KISS byte-stuffing.
pub fn kiss_escape(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    for &byte in data {
        match byte {
            FEND => {
                result.push(FESC);
                result.push(TFEND);
            }
            FESC => {
                result.push(FESC);
                result.push(TFESC);
            }
            _ => result.push(byte),
        }
    }
    result
}

/// Resolve KISS escape sequences.
///
/// A FESC followed by anything other than TFEND/TFESC, or a trailing FESC,
/// is a stuffing error.
pub fn kiss_unescape(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == FESC {
            match data.get(i + 1) {
                Some(&TFEND) => result.push(FEND),
                Some(&TFESC) => result.push(FESC),
                Some(&other) => return Err(FrameError::InvalidEscapeSequence(other)),
                None => return Err(FrameError::IncompleteEscape),
            }
            i += 2;
        } else {
            result.push(data[i]);
            i += 1;
        }
    }
    Ok(result)
}

/// Wrap a raw AX.25 frame as a KISS data frame for the given port.
pub fn kiss_data_frame(port: u8, data: &[u8]) -> Vec<u8> {
    let escaped = kiss_escape(data);
    let mut framed = Vec::with_capacity(escaped.len() + 3);
    framed.push(FEND);
    framed.push((port << 4) | CMD_DATA);
    framed.extend_from_slice(&escaped);
    framed.push(FEND);
    framed
}

/// The command nibble of a received type octet.
pub fn command_of(type_octet: u8) -> u8 {
    type_octet & 0x0F
}

/// The port nibble of a received type octet.
pub fn port_of(type_octet: u8) -> u8 {
    type_octet >> 4
}
