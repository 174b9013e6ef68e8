//! The terminal boundary: what the engine needs from the front end.
//!
//! The session loop talks to a [`Terminal`] trait object so the protocol
//! engine can be exercised against a scripted terminal in tests. The stock
//! implementation is a deliberately plain stdio terminal: line assembly,
//! pager detection, local echo, and a session transcript. Readline editing,
//! history, and ANSI color belong to a richer front end, not here.

use std::io::Write;
use std::sync::LazyLock;

use regex::Regex;

use paxterm_core::callsign::Callsign;
use paxterm_link::LinkStatus;

use crate::session_log::SessionLog;

/// Patterns that mark a BBS "press Enter to continue" pager prompt.
///
/// The engine itself never sees these; it only consumes the boolean.
static PAGER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)<\s*A\s*>?bort,\s*<\s*CR\s*>\s*Continue\.\.?>").expect("static pattern"),
        Regex::new(r"(?i)press\s*<\s*cr\s*>\s*to\s*continue").expect("static pattern"),
    ]
});

/// Whether a displayed line looks like a pager prompt.
pub fn is_pager_prompt(line: &str) -> bool {
    PAGER_PATTERNS.iter().any(|p| p.is_match(line.trim()))
}

/// Status events surfaced to the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Link(LinkStatus),
    TransportDown,
    UnprotoSent {
        dest: Callsign,
        digis: Vec<Callsign>,
        text: String,
    },
}

/// The narrow interface between the session loop and the front end.
pub trait Terminal {
    /// Deliver one inbound info field (I-frame text or a monitored UI frame).
    fn on_rx(&mut self, info: &[u8], source: &Callsign, pid: u8);

    /// Surface a status change.
    fn on_status(&mut self, status: &SessionStatus);

    /// Show a locally-generated line (echo, command output, hints).
    fn on_local(&mut self, line: &str);

    /// Whether a pager prompt is awaiting an answer.
    fn pager_pending(&self) -> bool;

    /// The user answered (or aborted) the pager prompt.
    fn clear_pager(&mut self);

    /// `/clear`.
    fn clear_screen(&mut self);
}

/// Plain stdout terminal with line assembly and a session transcript.
pub struct StdioTerminal {
    /// Partial inbound text, carried across frames until a newline lands.
    pending_text: String,
    pager_pending: bool,
    log: Option<SessionLog>,
}

impl StdioTerminal {
    pub fn new(log: Option<SessionLog>) -> Self {
        Self {
            pending_text: String::new(),
            pager_pending: false,
            log,
        }
    }

    pub fn log_path(&self) -> Option<String> {
        self.log
            .as_ref()
            .map(|l| l.path().display().to_string())
    }

    fn show(&mut self, line: &str) {
        println!("{line}");
        let _ = std::io::stdout().flush();
        if let Some(log) = &mut self.log {
            log.line(line);
        }
    }

    fn note_line_for_pager(&mut self, line: &str) {
        if is_pager_prompt(line) {
            self.pager_pending = true;
        } else if !line.trim().is_empty() {
            self.pager_pending = false;
        }
    }
}

impl Terminal for StdioTerminal {
    fn on_rx(&mut self, info: &[u8], _source: &Callsign, _pid: u8) {
        let chunk = String::from_utf8_lossy(info)
            .replace("\r\n", "\n")
            .replace('\r', "\n");
        self.pending_text.push_str(&chunk);

        while let Some(pos) = self.pending_text.find('\n') {
            let line: String = self.pending_text.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').to_string();
            self.show(&line);
            self.note_line_for_pager(&line);
        }

        // Pager prompts arrive without a trailing newline; show the partial
        // line once it matches so the prompt is visible.
        if !self.pending_text.is_empty() && is_pager_prompt(&self.pending_text) {
            let line = std::mem::take(&mut self.pending_text);
            self.show(&line);
            self.pager_pending = true;
        }
    }

    fn on_status(&mut self, status: &SessionStatus) {
        let line = match status {
            SessionStatus::Link(link) => match link {
                LinkStatus::Connecting {
                    peer,
                    attempt,
                    max_attempts,
                } => format!("[LINK] Calling {peer} (attempt {attempt}/{max_attempts}) ..."),
                LinkStatus::Connected { peer } => format!("[LINK] CONNECTED to {peer}"),
                LinkStatus::Disconnected => "[LINK] Disconnected.".to_string(),
                LinkStatus::PeerDisconnected { .. } => "[LINK] Peer requested DISC.".to_string(),
                LinkStatus::LinkLost { peer, attempts } => {
                    format!("[LINK] Link to {peer} lost after {attempts} retries.")
                }
                LinkStatus::ConnectTimedOut { peer, attempts } => {
                    format!("[LINK] Connect to {peer} timed out after {attempts} attempts.")
                }
                LinkStatus::PeerRefused { peer } => {
                    format!("[LINK] {peer} refused the connection (DM).")
                }
                LinkStatus::ProtocolError { peer } => {
                    format!("[LINK] Protocol error from {peer} (FRMR).")
                }
            },
            SessionStatus::TransportDown => "[KISS] TNC connection lost.".to_string(),
            SessionStatus::UnprotoSent { dest, digis, text } => {
                let via = if digis.is_empty() {
                    String::new()
                } else {
                    let names: Vec<String> = digis.iter().map(|d| d.to_string()).collect();
                    format!(" via {}", names.join(","))
                };
                format!("[UNPROTO] {dest}{via} :: {text}")
            }
        };
        self.show(&line);
    }

    fn on_local(&mut self, line: &str) {
        self.show(line);
    }

    fn pager_pending(&self) -> bool {
        self.pager_pending
    }

    fn clear_pager(&mut self) {
        self.pager_pending = false;
    }

    fn clear_screen(&mut self) {
        // ANSI clear + home; harmless on dumb terminals.
        print!("\x1b[2J\x1b[H");
        let _ = std::io::stdout().flush();
    }
}
