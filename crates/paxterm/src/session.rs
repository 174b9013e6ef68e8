//! The session dispatcher: one cooperative loop multiplexing the TNC,
//! protocol timers, and user input.
//!
//! All link-state mutation happens on this task. The TNC's reader hands
//! frames over through a channel, timer deadlines come from the machine,
//! and the terminal front end feeds lines through another channel.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use paxterm_core::callsign::Callsign;
use paxterm_core::frame::Ax25Frame;
use paxterm_link::{LinkAction, LinkMachine};
use paxterm_tnc::{KissTnc, TncError};

use crate::command::{self, Command};
use crate::terminal::{SessionStatus, Terminal};

/// Idle wake-up so pager-resume checks run even on a silent link.
const IDLE_TICK: Duration = Duration::from_secs(1);

const HELP: &str = "\
Commands: /c|/connect CALL [via DIGI1,DIGI2] | /d|/disconnect | \
/unproto DEST [via DIGI1,DIGI2] [msg...] | /upexit|/ex | /retries N | \
/echo on|off | /crlf on|off | /debug | /status | /clear | /help | /q|/quit";

/// User-toggleable line discipline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub local_echo: bool,
    pub crlf: bool,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_echo: true,
            crlf: false,
            debug: false,
        }
    }
}

/// Why the session loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `/quit` (or input EOF): exit 0.
    Quit,
    /// The TCP peer vanished: exit 1.
    TransportDown,
}

pub struct Session<T: Terminal> {
    machine: LinkMachine,
    tnc: KissTnc,
    term: T,
    settings: Settings,
    /// Persistent UNPROTO destination, when entered.
    unproto: Option<(Callsign, Vec<Callsign>)>,
    log_path: Option<String>,
}

impl<T: Terminal> Session<T> {
    pub fn new(
        machine: LinkMachine,
        tnc: KissTnc,
        term: T,
        settings: Settings,
        log_path: Option<String>,
    ) -> Self {
        Self {
            machine,
            tnc,
            term,
            settings,
            unproto: None,
            log_path,
        }
    }

    /// Kick off a connect before the loop starts (the TARGET argument).
    pub fn auto_connect(&mut self, target: Callsign, digis: Vec<Callsign>) {
        let actions = self.machine.connect(target, digis, Instant::now());
        self.apply(actions);
    }

    /// Drive the session until quit or transport loss.
    pub async fn run(&mut self, input: &mut mpsc::Receiver<String>) -> ExitReason {
        loop {
            let now = Instant::now();
            if self.machine.keepalive_paused() && !self.term.pager_pending() {
                self.machine.resume_keepalive(now);
            }

            let deadline = self
                .machine
                .next_deadline()
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + IDLE_TICK);

            // The select only picks the wake reason; handling happens after
            // the borrowed futures are gone.
            let wake = tokio::select! {
                frame = self.tnc.recv() => Wake::Frame(frame),
                line = input.recv() => Wake::Input(line),
                _ = tokio::time::sleep_until(deadline) => Wake::Timer,
            };

            match wake {
                Wake::Frame(Some(raw)) => self.on_raw(&raw),
                Wake::Frame(None) => {
                    self.term.on_status(&SessionStatus::TransportDown);
                    return ExitReason::TransportDown;
                }
                Wake::Input(Some(line)) => {
                    if self.on_input(line).await {
                        return ExitReason::Quit;
                    }
                }
                Wake::Input(None) => {
                    // Input closed (EOF): same path as /quit.
                    self.graceful_quit().await;
                    return ExitReason::Quit;
                }
                Wake::Timer => {
                    let pager = self.term.pager_pending();
                    let actions = self.machine.on_timers(Instant::now(), pager);
                    self.apply(actions);
                }
            }
        }
    }

    // ------------------------------------------------------------------ //
    // Inbound path
    // ------------------------------------------------------------------ //

    fn on_raw(&mut self, raw: &[u8]) {
        if self.settings.debug {
            self.term.on_local(&format!("[DBG] RX {}", hex::encode(raw)));
        }
        match Ax25Frame::decode(raw) {
            Ok(frame) => {
                let actions = self.machine.on_frame(&frame, Instant::now());
                self.apply(actions);
            }
            Err(e) => {
                // Malformed frames are logged and discarded, never reflected.
                debug!("discarding malformed frame: {e}");
            }
        }
    }

    fn apply(&mut self, actions: Vec<LinkAction>) {
        for action in actions {
            match action {
                LinkAction::Transmit(frame) => self.transmit(&frame),
                LinkAction::Deliver { info, source, pid } => {
                    self.term.on_rx(&info, &source, pid);
                }
                LinkAction::Status(status) => {
                    self.term.on_status(&SessionStatus::Link(status));
                }
            }
        }
    }

    fn transmit(&mut self, frame: &Ax25Frame) {
        let raw = frame.encode();
        if self.settings.debug {
            self.term.on_local(&format!("[DBG] TX {}", hex::encode(&raw)));
        }
        match self.tnc.send(&raw) {
            Ok(()) => {}
            Err(TncError::Busy) => {
                self.term.on_local("[KISS] Transmit buffer full; frame dropped.");
            }
            Err(e) => warn!("transmit failed: {e}"),
        }
    }

    // ------------------------------------------------------------------ //
    // User input path
    // ------------------------------------------------------------------ //

    /// Handle one input line. Returns true when the session should end.
    async fn on_input(&mut self, line: String) -> bool {
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let now = Instant::now();

        if let Some(cmd) = command::parse(&line) {
            return self.on_command(cmd, &line, now).await;
        }

        // Pager answers take priority over ordinary text.
        if self.term.pager_pending() && self.machine.is_connected() {
            if line.is_empty() {
                self.term.clear_pager();
                let actions = self.machine.send_line(self.wire_line(""), now);
                self.apply(actions);
                return false;
            }
            if line.eq_ignore_ascii_case("a") {
                self.term.clear_pager();
                let actions = self.machine.send_line(self.wire_line("A"), now);
                self.apply(actions);
                return false;
            }
        }
        if line.is_empty() {
            return false;
        }

        if let Some((dest, digis)) = self.unproto.clone() {
            self.send_unproto(dest, &digis, &line);
            return false;
        }

        if self.machine.is_connected() {
            self.send_text(&line, now);
        } else if self.machine.is_connecting() {
            let peer = self
                .machine
                .peer()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "(pending)".to_string());
            let _ = self.machine.send_line(self.wire_line(&line), now);
            self.term
                .on_local(&format!("[QUEUED] Will send after link to {peer} comes up."));
        } else {
            self.term
                .on_local("[LINK] Not connected. Use /connect CALL first.");
        }
        false
    }

    async fn on_command(&mut self, cmd: Command, raw_line: &str, now: Instant) -> bool {
        match cmd {
            Command::Connect { dest, digis } => {
                if self.machine.is_disconnected() {
                    let actions = self.machine.connect(dest, digis, now);
                    self.apply(actions);
                } else {
                    self.term
                        .on_local("[LINK] Already connected or connecting; /disconnect first.");
                }
            }
            Command::Disconnect => {
                if self.machine.is_disconnected() {
                    self.term.on_local("[LINK] Not connected.");
                } else {
                    let actions = self.machine.disconnect(now);
                    self.apply(actions);
                }
            }
            Command::UnprotoOneShot {
                dest,
                digis,
                message,
            } => self.send_unproto(dest, &digis, &message),
            Command::UnprotoEnter { dest, digis } => {
                let via = via_suffix(&digis);
                self.unproto = Some((dest, digis));
                self.term.on_local(&format!(
                    "[UNPROTO] Persistent mode ON -> {dest}{via}. Type /upexit to leave."
                ));
            }
            Command::UnprotoExit => {
                if self.unproto.take().is_some() {
                    self.term.on_local("[UNPROTO] Persistent mode OFF.");
                } else if self.machine.is_connected() {
                    // `/ex` with no unproto mode active belongs to the far
                    // BBS, like any other unrecognized slash command.
                    self.send_text(raw_line, now);
                } else {
                    self.term.on_local("[UNPROTO] Not in unproto mode.");
                }
            }
            Command::Retries(None) => {
                self.term.on_local(&format!(
                    "[RETRIES] Currently {}. Usage: /retries N",
                    self.machine.retries()
                ));
            }
            Command::Retries(Some(n)) => {
                let set = self.machine.set_retries(n);
                self.term.on_local(&format!("[RETRIES] Set to {set}"));
            }
            Command::Echo(on) => {
                self.settings.local_echo = on;
                self.term
                    .on_local(if on { "[ECHO] ON" } else { "[ECHO] OFF" });
            }
            Command::Crlf(on) => {
                self.settings.crlf = on;
                self.term.on_local(if on {
                    "[CRLF] ON (\\r\\n)"
                } else {
                    "[CRLF] OFF (\\r)"
                });
            }
            Command::Debug => {
                self.settings.debug = !self.settings.debug;
                self.term.on_local(if self.settings.debug {
                    "[DEBUG] ON"
                } else {
                    "[DEBUG] OFF"
                });
            }
            Command::Status => self.print_status(),
            Command::Clear => self.term.clear_screen(),
            Command::Help => self.term.on_local(HELP),
            Command::Quit => {
                self.graceful_quit().await;
                return true;
            }
            Command::Usage(usage) => self.term.on_local(usage),
            Command::Unknown(raw) => {
                if self.machine.is_connected() && self.unproto.is_none() {
                    // Nodes and BBSs have their own slash commands.
                    self.send_text(&raw, now);
                } else {
                    self.term.on_local("no ***");
                }
            }
        }
        false
    }

    fn print_status(&mut self) {
        let snap = self.machine.snapshot();
        let peer = snap
            .peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let digis = if snap.digis.is_empty() {
            "[]".to_string()
        } else {
            let names: Vec<String> = snap.digis.iter().map(|d| d.to_string()).collect();
            names.join(",")
        };
        let unproto = match &self.unproto {
            Some((dest, digis)) => format!("on to={dest}{}", via_suffix(digis)),
            None => "off".to_string(),
        };
        let log = self.log_path.as_deref().unwrap_or("(none)");
        self.term.on_local(&format!(
            "[STATUS] state={} dest={} vs={} vr={} va={} digis={} echo={} crlf={} retries={} unproto={} log={}",
            snap.state,
            peer,
            snap.vs,
            snap.vr,
            snap.va,
            digis,
            if self.settings.local_echo { "on" } else { "off" },
            if self.settings.crlf { "on" } else { "off" },
            snap.retries,
            unproto,
            log,
        ));
    }

    fn wire_line(&self, text: &str) -> Vec<u8> {
        let terminator = if self.settings.crlf { "\r\n" } else { "\r" };
        format!("{text}{terminator}").into_bytes()
    }

    fn send_text(&mut self, text: &str, now: Instant) {
        if self.settings.local_echo {
            self.term.on_local(&format!("> {text}"));
        }
        let actions = self.machine.send_line(self.wire_line(text), now);
        self.apply(actions);
    }

    fn send_unproto(&mut self, dest: Callsign, digis: &[Callsign], text: &str) {
        let frame = self.machine.unproto(dest, digis, text.as_bytes().to_vec());
        self.transmit(&frame);
        self.term.on_status(&SessionStatus::UnprotoSent {
            dest,
            digis: digis.to_vec(),
            text: text.to_string(),
        });
    }

    /// Disconnect and wait at most T1 for the peer's UA or DM before
    /// returning; quitting must never hang on a dead peer.
    async fn graceful_quit(&mut self) {
        if !self.machine.is_disconnected() {
            let actions = self.machine.disconnect(Instant::now());
            self.apply(actions);
        }

        let deadline = tokio::time::Instant::now() + self.machine.config().t1;
        while !self.machine.is_disconnected() {
            let wake = tokio::select! {
                frame = self.tnc.recv() => Wake::Frame(frame),
                _ = tokio::time::sleep_until(deadline) => Wake::Timer,
            };
            match wake {
                Wake::Frame(Some(raw)) => self.on_raw(&raw),
                _ => break,
            }
        }
    }
}

/// Why the session loop woke up.
enum Wake {
    Frame(Option<Vec<u8>>),
    Input(Option<String>),
    Timer,
}

fn via_suffix(digis: &[Callsign]) -> String {
    if digis.is_empty() {
        String::new()
    } else {
        let names: Vec<String> = digis.iter().map(|d| d.to_string()).collect();
        format!(" via {}", names.join(","))
    }
}
