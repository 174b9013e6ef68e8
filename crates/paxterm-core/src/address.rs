//! The AX.25 address field: destination, source, and digipeater chain.

use crate::callsign::Callsign;
use crate::constants::{ADDR_LEN, MAX_DIGIPEATERS, MIN_FRAME_LEN};
use crate::error::FrameError;

/// One entry in the requested digipeater path.
///
/// `repeated` is the H bit: whether the frame has already passed through
/// this station. Outbound frames always request with H clear; the engine
/// never repeats for others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digipeater {
    pub callsign: Callsign,
    pub repeated: bool,
}

impl Digipeater {
    pub fn new(callsign: Callsign) -> Self {
        Self {
            callsign,
            repeated: false,
        }
    }
}

/// A decoded address chain: 2-10 callsigns in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct AddressField {
    pub destination: Callsign,
    pub source: Callsign,
    pub digipeaters: Vec<Digipeater>,
}

impl AddressField {
    pub fn new(destination: Callsign, source: Callsign, digipeaters: Vec<Digipeater>) -> Self {
        Self {
            destination,
            source,
            digipeaters,
        }
    }

    /// Encoded size in octets.
    pub fn encoded_len(&self) -> usize {
        (2 + self.digipeaters.len()) * ADDR_LEN
    }

    /// Serialize the chain.
    ///
    /// `command` drives the C bits: set on the destination and clear on the
    /// source for command frames, the reverse for responses. The extension
    /// bit lands on the last address present.
    pub fn encode_into(&self, out: &mut Vec<u8>, command: bool) {
        let digis_last = self.digipeaters.is_empty();
        out.extend_from_slice(&self.destination.encode(false, command));
        out.extend_from_slice(&self.source.encode(digis_last, !command));
        for (i, digi) in self.digipeaters.iter().enumerate() {
            let last = i == self.digipeaters.len() - 1;
            out.extend_from_slice(&digi.callsign.encode(last, digi.repeated));
        }
    }

    /// Parse an address chain from the front of a raw frame.
    ///
    /// Returns the field, the command flag derived from the destination C
    /// bit, and the number of octets consumed.
    pub fn decode(raw: &[u8]) -> Result<(Self, bool, usize), FrameError> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort {
                min: MIN_FRAME_LEN,
                actual: raw.len(),
            });
        }

        let dest_octets: [u8; ADDR_LEN] = raw[..ADDR_LEN].try_into().expect("length checked");
        let (destination, dest_c, dest_last) = Callsign::decode(&dest_octets)?;
        if dest_last {
            // A chain needs at least a source address after the destination.
            return Err(FrameError::UnterminatedAddressChain);
        }

        let src_octets: [u8; ADDR_LEN] =
            raw[ADDR_LEN..2 * ADDR_LEN].try_into().expect("length checked");
        let (source, _src_c, mut last) = Callsign::decode(&src_octets)?;

        let mut digipeaters = Vec::new();
        let mut consumed = 2 * ADDR_LEN;
        while !last {
            if digipeaters.len() == MAX_DIGIPEATERS {
                return Err(FrameError::TooManyDigipeaters {
                    max: MAX_DIGIPEATERS,
                });
            }
            if raw.len() < consumed + ADDR_LEN {
                return Err(FrameError::UnterminatedAddressChain);
            }
            let octets: [u8; ADDR_LEN] = raw[consumed..consumed + ADDR_LEN]
                .try_into()
                .expect("length checked");
            let (callsign, repeated, is_last) = Callsign::decode(&octets)?;
            digipeaters.push(Digipeater { callsign, repeated });
            consumed += ADDR_LEN;
            last = is_last;
        }

        Ok((
            Self {
                destination,
                source,
                digipeaters,
            },
            dest_c,
            consumed,
        ))
    }
}
