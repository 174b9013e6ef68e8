//! Link-layer tuning knobs, gathered into one record.

use std::time::Duration;

/// Retry and timer parameters for one link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Maximum transmission attempts before the link is declared lost.
    pub n2: u32,
    /// Retransmit/acknowledgement supervision timer.
    pub t1: Duration,
    /// Idle keepalive timer; runs only while T1 does not.
    pub t3: Duration,
    /// Maximum outstanding (unacknowledged) I-frames, 1..=7.
    pub window_k: u8,
    /// Whether a received FRMR tears the link down (the default) or is
    /// logged and answered with a counter reset.
    pub frmr_fatal: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            n2: 3,
            t1: Duration::from_secs(4),
            t3: Duration::from_secs(180),
            window_k: 4,
            frmr_fatal: true,
        }
    }
}

impl LinkConfig {
    /// Clamp every field into its legal range.
    pub fn clamped(mut self) -> Self {
        self.n2 = self.n2.clamp(1, 10);
        self.window_k = self.window_k.clamp(1, 7);
        self
    }
}
