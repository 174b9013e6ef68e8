//! Station callsigns and their 7-octet on-air encoding.
//!
//! A callsign is a 1-6 character base (uppercase letters and digits) plus a
//! 4-bit SSID. On the air each base character is shifted left one bit and the
//! base is right-padded with shifted spaces to six octets; the seventh octet
//! carries the SSID in bits 1-4, the C (or H) bit in bit 7, the two reserved
//! bits, and the address-extension bit in bit 0.

use core::fmt;
use std::str::FromStr;

use crate::constants::{SSID_CH_BIT, SSID_EXTENSION, SSID_RESERVED};
use crate::error::CallsignError;

/// A normalized station identifier: uppercase space-padded base plus SSID.
///
/// Comparison is case-insensitive on the base (normalization happens at
/// construction) and exact on the SSID.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct Callsign {
    base: [u8; 6],
    ssid: u8,
}

impl Callsign {
    /// Build a callsign from a base string and SSID.
    pub fn new(base: &str, ssid: u8) -> Result<Self, CallsignError> {
        if base.is_empty() {
            return Err(CallsignError::Empty);
        }
        if base.len() > 6 {
            return Err(CallsignError::BadLength(base.len()));
        }
        if ssid > 15 {
            return Err(CallsignError::BadSsid(ssid as u32));
        }

        let mut padded = [b' '; 6];
        for (i, ch) in base.chars().enumerate() {
            let up = ch.to_ascii_uppercase();
            if !up.is_ascii_uppercase() && !up.is_ascii_digit() {
                return Err(CallsignError::BadCharacter(ch));
            }
            padded[i] = up as u8;
        }

        Ok(Self { base: padded, ssid })
    }

    /// The base portion, trailing padding stripped.
    pub fn base(&self) -> &str {
        let end = self
            .base
            .iter()
            .rposition(|&b| b != b' ')
            .map_or(0, |i| i + 1);
        // Construction only admits ASCII, so this cannot fail.
        std::str::from_utf8(&self.base[..end]).unwrap_or("")
    }

    /// The 4-bit secondary station identifier.
    pub fn ssid(&self) -> u8 {
        self.ssid
    }

    /// Encode into the 7-octet on-air form.
    ///
    /// `last` sets the address-extension bit, `ch_bit` sets bit 7 (the C bit
    /// on destination/source addresses, the H bit on digipeaters).
    pub fn encode(&self, last: bool, ch_bit: bool) -> [u8; 7] {
        let mut out = [0u8; 7];
        for (i, &b) in self.base.iter().enumerate() {
            out[i] = b << 1;
        }
        let mut ssid_octet = SSID_RESERVED | ((self.ssid & 0x0F) << 1);
        if ch_bit {
            ssid_octet |= SSID_CH_BIT;
        }
        if last {
            ssid_octet |= SSID_EXTENSION;
        }
        out[6] = ssid_octet;
        out
    }

    /// Decode a 7-octet on-air address.
    ///
    /// Returns the callsign together with the raw bit-7 flag (C or H,
    /// depending on the address position) and the extension bit.
    pub fn decode(octets: &[u8; 7]) -> Result<(Self, bool, bool), CallsignError> {
        let mut base = [b' '; 6];
        for (i, &o) in octets[..6].iter().enumerate() {
            let ch = (o >> 1) & 0x7F;
            let up = (ch as char).to_ascii_uppercase();
            if up != ' ' && !up.is_ascii_uppercase() && !up.is_ascii_digit() {
                return Err(CallsignError::BadCharacter(ch as char));
            }
            base[i] = up as u8;
        }
        if base[0] == b' ' {
            return Err(CallsignError::Empty);
        }
        let ssid = (octets[6] >> 1) & 0x0F;
        let ch_bit = octets[6] & SSID_CH_BIT != 0;
        let last = octets[6] & SSID_EXTENSION != 0;
        Ok((Self { base, ssid }, ch_bit, last))
    }
}

impl FromStr for Callsign {
    type Err = CallsignError;

    /// Parse `"KC3SMW"` or `"KC3SMW-7"` (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('-') {
            Some((base, ssid)) => {
                let ssid: u32 = ssid
                    .parse()
                    .map_err(|_| CallsignError::BadSsid(u32::MAX))?;
                if ssid > 15 {
                    return Err(CallsignError::BadSsid(ssid));
                }
                Self::new(base, ssid as u8)
            }
            None => Self::new(s, 0),
        }
    }
}

impl fmt::Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base(), self.ssid)
    }
}

impl fmt::Debug for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callsign({self})")
    }
}
