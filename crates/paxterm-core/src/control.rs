//! The AX.25 control octet (modulo-8).
//!
//! Frame format is selected by the low bits: `xxxxxxx0` is an I-frame,
//! `xxxxxx01` a supervisory frame, `xxxxxx11` unnumbered.

use crate::constants::PF_MASK;
use crate::error::FrameError;

/// Supervisory frame kinds, from the SS bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SFrame {
    ReceiveReady,
    ReceiveNotReady,
    Reject,
}

impl SFrame {
    fn bits(self) -> u8 {
        match self {
            SFrame::ReceiveReady => 0b00,
            SFrame::ReceiveNotReady => 0b01,
            SFrame::Reject => 0b10,
        }
    }
}

/// Unnumbered frame kinds, matched against the fixed bit patterns with the
/// P/F bit masked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UFrame {
    Sabm,
    Sabme,
    Disc,
    Dm,
    Ua,
    Frmr,
    Ui,
}

impl UFrame {
    fn bits(self) -> u8 {
        match self {
            UFrame::Sabm => 0x2F,
            UFrame::Sabme => 0x6F,
            UFrame::Disc => 0x43,
            UFrame::Dm => 0x0F,
            UFrame::Ua => 0x63,
            UFrame::Frmr => 0x87,
            UFrame::Ui => 0x03,
        }
    }

    fn from_bits(base: u8) -> Option<Self> {
        match base {
            0x2F => Some(UFrame::Sabm),
            0x6F => Some(UFrame::Sabme),
            0x43 => Some(UFrame::Disc),
            0x0F => Some(UFrame::Dm),
            0x63 => Some(UFrame::Ua),
            0x87 => Some(UFrame::Frmr),
            0x03 => Some(UFrame::Ui),
            _ => None,
        }
    }

    /// Whether this frame type carries a PID and info field.
    pub fn has_pid(self) -> bool {
        matches!(self, UFrame::Ui)
    }
}

/// A decoded control octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Control {
    /// Information frame: send/receive sequence numbers plus the P bit.
    I { ns: u8, nr: u8, poll: bool },
    /// Supervisory frame: N(R) plus the P/F bit.
    S {
        kind: SFrame,
        nr: u8,
        poll_final: bool,
    },
    /// Unnumbered frame.
    U { kind: UFrame, poll_final: bool },
}

impl Control {
    pub fn to_byte(self) -> u8 {
        match self {
            Control::I { ns, nr, poll } => {
                ((nr & 0x07) << 5) | (u8::from(poll) << 4) | ((ns & 0x07) << 1)
            }
            Control::S {
                kind,
                nr,
                poll_final,
            } => ((nr & 0x07) << 5) | (u8::from(poll_final) << 4) | (kind.bits() << 2) | 0b01,
            Control::U { kind, poll_final } => {
                kind.bits() | if poll_final { PF_MASK } else { 0 }
            }
        }
    }

    pub fn from_byte(octet: u8) -> Result<Self, FrameError> {
        if octet & 0x01 == 0 {
            return Ok(Control::I {
                ns: (octet >> 1) & 0x07,
                nr: (octet >> 5) & 0x07,
                poll: octet & PF_MASK != 0,
            });
        }
        if octet & 0x03 == 0b01 {
            let kind = match (octet >> 2) & 0x03 {
                0b00 => SFrame::ReceiveReady,
                0b01 => SFrame::ReceiveNotReady,
                0b10 => SFrame::Reject,
                _ => return Err(FrameError::InvalidControl(octet)),
            };
            return Ok(Control::S {
                kind,
                nr: (octet >> 5) & 0x07,
                poll_final: octet & PF_MASK != 0,
            });
        }
        let base = octet & !PF_MASK;
        match UFrame::from_bits(base) {
            Some(kind) => Ok(Control::U {
                kind,
                poll_final: octet & PF_MASK != 0,
            }),
            None => Err(FrameError::InvalidControl(octet)),
        }
    }

    /// Whether this control octet is followed by a PID octet.
    pub fn has_pid(self) -> bool {
        match self {
            Control::I { .. } => true,
            Control::U { kind, .. } => kind.has_pid(),
            Control::S { .. } => false,
        }
    }

    /// The P/F bit, whichever frame format carries it.
    pub fn poll_final(self) -> bool {
        match self {
            Control::I { poll, .. } => poll,
            Control::S { poll_final, .. } | Control::U { poll_final, .. } => poll_final,
        }
    }
}
