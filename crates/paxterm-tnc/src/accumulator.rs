//! Streaming KISS frame accumulator for byte streams.
//!
//! Holds a rolling buffer and extracts complete FEND-delimited frames as TCP
//! segments arrive, so a frame split across any number of reads still comes
//! out whole. Unescaping happens after delimiting; a frame whose stuffing is
//! broken is dropped rather than surfaced.

use paxterm_core::kiss::{kiss_unescape, FEND};
use tracing::trace;

/// Stateful accumulator that buffers stream data and extracts complete
/// KISS frames delimited by FEND (0xC0) bytes.
///
/// - Scans for pairs of FEND delimiters
/// - Empty frames (back-to-back FENDs) are silently dropped
/// - Bytes before the first FEND are line noise and discarded
/// - The closing FEND is retained as the potential opener of the next frame
pub struct KissAccumulator {
    buffer: Vec<u8>,
}

/// One deframed KISS transmission: the type octet plus the unescaped payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KissFrame {
    pub type_octet: u8,
    pub payload: Vec<u8>,
}

impl KissAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
        }
    }

    /// Feed new data from the stream and extract all complete frames.
    pub fn feed(&mut self, data: &[u8]) -> Vec<KissFrame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();

        loop {
            let Some(start) = self.buffer.iter().position(|&b| b == FEND) else {
                // No delimiter anywhere: everything so far is noise.
                self.buffer.clear();
                break;
            };
            let Some(offset) = self.buffer[start + 1..].iter().position(|&b| b == FEND) else {
                // An open frame is pending; drop the leading noise and wait.
                if start > 0 {
                    self.buffer.drain(..start);
                }
                break;
            };
            let end = start + 1 + offset;

            let inner = &self.buffer[start + 1..end];
            if !inner.is_empty() {
                match kiss_unescape(&inner[1..]) {
                    Ok(payload) => frames.push(KissFrame {
                        type_octet: inner[0],
                        payload,
                    }),
                    Err(e) => trace!("dropping frame with broken stuffing: {e}"),
                }
            }

            // The closing FEND may open the next frame.
            self.buffer.drain(..end);
        }

        frames
    }
}

impl Default for KissAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
