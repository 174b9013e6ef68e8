//! Whole-frame assembly and parsing.

use crate::address::AddressField;
use crate::callsign::Callsign;
use crate::constants::{MIN_FRAME_LEN, PID_NO_LAYER3};
use crate::control::{Control, UFrame};
use crate::error::FrameError;

/// A complete AX.25 frame between the KISS layer and the link machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Ax25Frame {
    pub addresses: AddressField,
    /// Whether the frame is a command (destination C bit set) or response.
    pub command: bool,
    pub control: Control,
    /// Present on I and UI frames; the engine only ever emits 0xF0.
    pub pid: Option<u8>,
    pub info: Vec<u8>,
}

impl Ax25Frame {
    /// Build a command frame with no payload (SABM, DISC, RR, ...).
    pub fn command(addresses: AddressField, control: Control) -> Self {
        Self {
            addresses,
            command: true,
            control,
            pid: None,
            info: Vec::new(),
        }
    }

    /// Build a response frame with no payload (UA, DM, RR replies, ...).
    pub fn response(addresses: AddressField, control: Control) -> Self {
        Self {
            addresses,
            command: false,
            control,
            pid: None,
            info: Vec::new(),
        }
    }

    /// Build an I-frame carrying `info` under PID F0.
    pub fn information(addresses: AddressField, ns: u8, nr: u8, poll: bool, info: Vec<u8>) -> Self {
        Self {
            addresses,
            command: true,
            control: Control::I { ns, nr, poll },
            pid: Some(PID_NO_LAYER3),
            info,
        }
    }

    /// Build a UI frame carrying `info` under PID F0.
    pub fn unnumbered_information(addresses: AddressField, info: Vec<u8>) -> Self {
        Self {
            addresses,
            command: true,
            control: Control::U {
                kind: UFrame::Ui,
                poll_final: false,
            },
            pid: Some(PID_NO_LAYER3),
            info,
        }
    }

    pub fn source(&self) -> &Callsign {
        &self.addresses.source
    }

    pub fn destination(&self) -> &Callsign {
        &self.addresses.destination
    }

    /// Serialize to the raw octets carried inside a KISS data frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.addresses.encoded_len() + 2 + self.info.len());
        self.addresses.encode_into(&mut out, self.command);
        out.push(self.control.to_byte());
        if let Some(pid) = self.pid {
            out.push(pid);
        }
        out.extend_from_slice(&self.info);
        out
    }

    /// Parse raw octets from the KISS layer.
    pub fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < MIN_FRAME_LEN {
            return Err(FrameError::TooShort {
                min: MIN_FRAME_LEN,
                actual: raw.len(),
            });
        }

        let (addresses, command, consumed) = AddressField::decode(raw)?;
        let rest = &raw[consumed..];
        let Some((&control_octet, after_control)) = rest.split_first() else {
            return Err(FrameError::TooShort {
                min: consumed + 1,
                actual: raw.len(),
            });
        };
        let control = Control::from_byte(control_octet)?;

        let (pid, info) = if control.has_pid() {
            let Some((&pid, info)) = after_control.split_first() else {
                return Err(FrameError::MissingPid);
            };
            (Some(pid), info.to_vec())
        } else {
            // FRMR carries a 3-octet diagnostic info field; other S/U frames
            // have nothing after the control octet. Either way the bytes are
            // kept for the caller.
            (None, after_control.to_vec())
        };

        Ok(Self {
            addresses,
            command,
            control,
            pid,
            info,
        })
    }
}
