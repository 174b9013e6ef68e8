//! The LAPB connection state machine for one peer.
//!
//! State lives in a single owned struct; the session loop feeds it decoded
//! frames, timer ticks, and user operations, and acts on the returned
//! [`LinkAction`]s. All sequence arithmetic is modulo 8.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use paxterm_core::address::{AddressField, Digipeater};
use paxterm_core::callsign::Callsign;
use paxterm_core::constants::PID_NO_LAYER3;
use paxterm_core::control::{Control, SFrame, UFrame};
use paxterm_core::frame::Ax25Frame;

use crate::config::LinkConfig;
use crate::seq;
use crate::timer::Timer;

/// How long an in-sequence I-frame may wait for a piggyback before a bare
/// RR acknowledges it.
const ACK_COALESCE: Duration = Duration::from_millis(100);

/// Something the session loop must do on the machine's behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum LinkAction {
    /// Hand this frame to the KISS transport.
    Transmit(Ax25Frame),
    /// Deliver an info field to the terminal.
    Deliver {
        info: Vec<u8>,
        source: Callsign,
        pid: u8,
    },
    /// Surface a status change to the terminal.
    Status(LinkStatus),
}

/// Link status changes surfaced to the terminal layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Connecting {
        peer: Callsign,
        attempt: u32,
        max_attempts: u32,
    },
    Connected {
        peer: Callsign,
    },
    Disconnected,
    PeerDisconnected {
        peer: Callsign,
    },
    LinkLost {
        peer: Callsign,
        attempts: u32,
    },
    ConnectTimedOut {
        peer: Callsign,
        attempts: u32,
    },
    PeerRefused {
        peer: Callsign,
    },
    ProtocolError {
        peer: Callsign,
    },
}

/// An I-frame awaiting acknowledgement. The payload is retained until V(A)
/// passes its N(S).
#[derive(Debug, Clone)]
struct Outstanding {
    ns: u8,
    payload: Vec<u8>,
}

#[derive(Debug)]
struct Connecting {
    peer: Callsign,
    digis: Vec<Callsign>,
    attempt: u32,
    /// The first attempt goes out as SABME; a DM or FRMR answering it falls
    /// through to SABM without consuming a retry.
    sabme_outstanding: bool,
    /// Plain lines typed during the handshake, flushed after UA.
    queued: VecDeque<Vec<u8>>,
}

#[derive(Debug)]
struct Established {
    peer: Callsign,
    digis: Vec<Callsign>,
    vs: u8,
    vr: u8,
    va: u8,
    unacked: VecDeque<Outstanding>,
    /// User payloads held back by the window or a busy peer.
    pending: VecDeque<Vec<u8>>,
    peer_busy: bool,
    retries: u32,
}

impl Established {
    fn new(peer: Callsign, digis: Vec<Callsign>) -> Self {
        Self {
            peer,
            digis,
            vs: 0,
            vr: 0,
            va: 0,
            unacked: VecDeque::new(),
            pending: VecDeque::new(),
            peer_busy: false,
            retries: 0,
        }
    }
}

#[derive(Debug)]
struct Releasing {
    peer: Callsign,
    digis: Vec<Callsign>,
    attempt: u32,
}

#[derive(Debug)]
enum State {
    Disconnected,
    Connecting(Connecting),
    Connected(Established),
    Releasing(Releasing),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Disconnected => "DISCONNECTED",
            State::Connecting(_) => "AWAITING_CONNECT",
            State::Connected(_) => "CONNECTED",
            State::Releasing(_) => "AWAITING_RELEASE",
        }
    }
}

/// Point-in-time view of the link for `/status`.
#[derive(Debug, Clone)]
pub struct LinkSnapshot {
    pub state: &'static str,
    pub peer: Option<Callsign>,
    pub digis: Vec<Callsign>,
    pub vs: u8,
    pub vr: u8,
    pub va: u8,
    pub retries: u32,
}

/// The LAPB engine for a single local station.
pub struct LinkMachine {
    local: Callsign,
    config: LinkConfig,
    state: State,
    t1: Timer,
    t3: Timer,
    ack_delay: Timer,
}

impl LinkMachine {
    pub fn new(local: Callsign, config: LinkConfig) -> Self {
        Self {
            local,
            config: config.clamped(),
            state: State::Disconnected,
            t1: Timer::default(),
            t3: Timer::default(),
            ack_delay: Timer::default(),
        }
    }

    pub fn local(&self) -> &Callsign {
        &self.local
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, State::Connected(_))
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self.state, State::Disconnected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self.state, State::Connecting(_))
    }

    pub fn peer(&self) -> Option<&Callsign> {
        match &self.state {
            State::Disconnected => None,
            State::Connecting(c) => Some(&c.peer),
            State::Connected(e) => Some(&e.peer),
            State::Releasing(r) => Some(&r.peer),
        }
    }

    /// Update the retry budget (`/retries`), clamped to 1..=10.
    pub fn set_retries(&mut self, n2: u32) -> u32 {
        self.config.n2 = n2.clamp(1, 10);
        self.config.n2
    }

    pub fn retries(&self) -> u32 {
        self.config.n2
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let (vs, vr, va) = match &self.state {
            State::Connected(e) => (e.vs, e.vr, e.va),
            _ => (0, 0, 0),
        };
        let digis = match &self.state {
            State::Connecting(c) => c.digis.clone(),
            State::Connected(e) => e.digis.clone(),
            State::Releasing(r) => r.digis.clone(),
            State::Disconnected => Vec::new(),
        };
        LinkSnapshot {
            state: self.state.name(),
            peer: self.peer().copied(),
            digis,
            vs,
            vr,
            va,
            retries: self.config.n2,
        }
    }

    /// The earliest pending deadline, for the session loop to sleep on.
    pub fn next_deadline(&self) -> Option<Instant> {
        [&self.t1, &self.t3, &self.ack_delay]
            .into_iter()
            .filter_map(Timer::deadline)
            .min()
    }

    pub fn keepalive_paused(&self) -> bool {
        self.t3.is_paused()
    }

    /// Suspend the idle keepalive while the terminal reports a pager prompt
    /// pending. Remaining time is preserved.
    pub fn pause_keepalive(&mut self, now: Instant) {
        self.t3.pause(now);
    }

    /// Resume the keepalive after the pager prompt has been answered.
    pub fn resume_keepalive(&mut self, now: Instant) {
        self.t3.resume(now);
    }

    // ------------------------------------------------------------------ //
    // User operations
    // ------------------------------------------------------------------ //

    /// Initiate a connection. Only valid while DISCONNECTED; the session
    /// loop guards re-entry.
    pub fn connect(
        &mut self,
        peer: Callsign,
        digis: Vec<Callsign>,
        now: Instant,
    ) -> Vec<LinkAction> {
        if !matches!(self.state, State::Disconnected) {
            debug!(state = self.state.name(), "connect ignored");
            return Vec::new();
        }

        debug!(%peer, "calling");
        let frame = Self::build_u(&self.local, &peer, &digis, UFrame::Sabme, true, true);
        self.t1.start(now, self.config.t1);
        self.t3.stop();
        let max_attempts = self.config.n2;
        self.state = State::Connecting(Connecting {
            peer,
            digis,
            attempt: 1,
            sabme_outstanding: true,
            queued: VecDeque::new(),
        });

        vec![
            LinkAction::Status(LinkStatus::Connecting {
                peer,
                attempt: 1,
                max_attempts,
            }),
            LinkAction::Transmit(frame),
        ]
    }

    /// Tear the link down. Idempotent: repeated calls emit at most one DISC.
    pub fn disconnect(&mut self, now: Instant) -> Vec<LinkAction> {
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Connected(e) => {
                // Unacked frames are abandoned; the DISC goes out regardless
                // of backlog.
                let frame = Self::build_u(&self.local, &e.peer, &e.digis, UFrame::Disc, true, true);
                self.t1.start(now, self.config.t1);
                self.t3.stop();
                self.ack_delay.stop();
                self.state = State::Releasing(Releasing {
                    peer: e.peer,
                    digis: e.digis,
                    attempt: 1,
                });
                vec![LinkAction::Transmit(frame)]
            }
            State::Connecting(_) => {
                self.t1.stop();
                vec![LinkAction::Status(LinkStatus::Disconnected)]
            }
            State::Releasing(r) => {
                // DISC already in flight.
                self.state = State::Releasing(r);
                Vec::new()
            }
            State::Disconnected => Vec::new(),
        }
    }

    /// Queue or transmit one line of user text as an I-frame payload.
    pub fn send_line(&mut self, payload: Vec<u8>, now: Instant) -> Vec<LinkAction> {
        match &mut self.state {
            State::Connected(_) => {
                let mut actions = Vec::new();
                self.enqueue_info(payload, now, &mut actions);
                actions
            }
            State::Connecting(c) => {
                trace!("queueing line until UA");
                c.queued.push_back(payload);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    /// Build a UI frame. Link state is never touched.
    pub fn unproto(&self, dest: Callsign, digis: &[Callsign], payload: Vec<u8>) -> Ax25Frame {
        let addresses = AddressField::new(
            dest,
            self.local,
            digis.iter().copied().map(Digipeater::new).collect(),
        );
        Ax25Frame::unnumbered_information(addresses, payload)
    }

    // ------------------------------------------------------------------ //
    // Inbound frames
    // ------------------------------------------------------------------ //

    pub fn on_frame(&mut self, frame: &Ax25Frame, now: Instant) -> Vec<LinkAction> {
        // UI frames are monitored in every state and never touch the
        // sequence variables.
        if let Control::U {
            kind: UFrame::Ui, ..
        } = frame.control
        {
            return vec![LinkAction::Deliver {
                info: frame.info.clone(),
                source: *frame.source(),
                pid: frame.pid.unwrap_or(PID_NO_LAYER3),
            }];
        }

        if *frame.destination() != self.local {
            trace!(dest = %frame.destination(), "frame for another station");
            return Vec::new();
        }

        match &self.state {
            State::Disconnected => self.on_frame_disconnected(frame, now),
            State::Connecting(_) => self.on_frame_connecting(frame, now),
            State::Connected(_) => self.on_frame_connected(frame, now),
            State::Releasing(_) => self.on_frame_releasing(frame),
        }
    }

    fn on_frame_disconnected(&mut self, frame: &Ax25Frame, now: Instant) -> Vec<LinkAction> {
        match frame.control {
            Control::U {
                kind: UFrame::Sabm | UFrame::Sabme,
                poll_final: true,
            } => self.accept_incoming_connect(frame, now),
            Control::U {
                kind: UFrame::Disc,
                poll_final,
            } => vec![LinkAction::Transmit(self.dm_reply(frame, poll_final))],
            // Responses draw no reply; answering DM with DM would loop.
            Control::U {
                kind: UFrame::Dm | UFrame::Ua | UFrame::Frmr,
                ..
            } => Vec::new(),
            _ if frame.command => {
                // A command for a link that does not exist.
                vec![LinkAction::Transmit(
                    self.dm_reply(frame, frame.control.poll_final()),
                )]
            }
            _ => Vec::new(),
        }
    }

    fn accept_incoming_connect(&mut self, frame: &Ax25Frame, now: Instant) -> Vec<LinkAction> {
        let peer = *frame.source();
        // Answer back over the path the frame arrived on, reversed, with
        // the has-been-repeated bits cleared.
        let digis: Vec<Callsign> = frame
            .addresses
            .digipeaters
            .iter()
            .rev()
            .map(|d| d.callsign)
            .collect();

        debug!(%peer, "incoming connect accepted");
        let ua = Self::build_u(&self.local, &peer, &digis, UFrame::Ua, true, false);
        self.state = State::Connected(Established::new(peer, digis));
        self.t1.stop();
        self.ack_delay.stop();
        self.t3.start(now, self.config.t3);

        vec![
            LinkAction::Transmit(ua),
            LinkAction::Status(LinkStatus::Connected { peer }),
        ]
    }

    fn on_frame_connecting(&mut self, frame: &Ax25Frame, now: Instant) -> Vec<LinkAction> {
        let (peer, sabme_outstanding) = match &self.state {
            State::Connecting(c) => (c.peer, c.sabme_outstanding),
            _ => return Vec::new(),
        };
        if *frame.source() != peer {
            return Vec::new();
        }

        match frame.control {
            Control::U {
                kind: UFrame::Ua,
                poll_final: true,
            } => {
                let c = match std::mem::replace(&mut self.state, State::Disconnected) {
                    State::Connecting(c) => c,
                    _ => return Vec::new(),
                };
                debug!(%peer, "link established");
                self.t1.stop();
                self.t3.start(now, self.config.t3);
                self.state = State::Connected(Established::new(peer, c.digis));

                let mut actions = vec![LinkAction::Status(LinkStatus::Connected { peer })];
                // Flush lines typed during the handshake, in order.
                for payload in c.queued {
                    self.enqueue_info(payload, now, &mut actions);
                }
                actions
            }
            Control::U {
                kind: UFrame::Dm | UFrame::Frmr,
                ..
            } if sabme_outstanding => {
                // The peer balked at SABME; fall through to plain SABM
                // without consuming a retry.
                debug!("SABME refused, falling back to SABM");
                let sabm = {
                    let State::Connecting(c) = &mut self.state else {
                        return Vec::new();
                    };
                    c.sabme_outstanding = false;
                    Self::build_u(&self.local, &c.peer, &c.digis, UFrame::Sabm, true, true)
                };
                self.t1.start(now, self.config.t1);
                vec![LinkAction::Transmit(sabm)]
            }
            Control::U {
                kind: UFrame::Dm, ..
            } => {
                debug!(%peer, "connect refused (DM)");
                self.enter_disconnected();
                vec![LinkAction::Status(LinkStatus::PeerRefused { peer })]
            }
            Control::U {
                kind: UFrame::Sabm | UFrame::Sabme,
                poll_final: true,
            } => {
                // Both sides called out at once; accept theirs.
                self.accept_incoming_connect(frame, now)
            }
            Control::U {
                kind: UFrame::Disc,
                poll_final,
            } => vec![LinkAction::Transmit(self.dm_reply(frame, poll_final))],
            _ => Vec::new(),
        }
    }

    fn on_frame_connected(&mut self, frame: &Ax25Frame, now: Instant) -> Vec<LinkAction> {
        let peer = match &self.state {
            State::Connected(e) => e.peer,
            _ => return Vec::new(),
        };
        if *frame.source() != peer {
            // A third station talking into an existing link: commands get
            // DM, responses are dropped.
            if frame.command {
                return vec![LinkAction::Transmit(
                    self.dm_reply(frame, frame.control.poll_final()),
                )];
            }
            return Vec::new();
        }

        let mut actions = Vec::new();
        match frame.control {
            Control::I { ns, nr, poll } => {
                self.apply_ack(nr, now);
                let expected = {
                    let State::Connected(e) = &mut self.state else {
                        return actions;
                    };
                    if ns == e.vr {
                        e.vr = seq::increment(e.vr);
                        true
                    } else {
                        false
                    }
                };
                if expected {
                    actions.push(LinkAction::Deliver {
                        info: frame.info.clone(),
                        source: *frame.source(),
                        pid: frame.pid.unwrap_or(PID_NO_LAYER3),
                    });
                    if poll {
                        self.ack_delay.stop();
                        actions.push(LinkAction::Transmit(self.rr_response(true)));
                    } else if !self.ack_delay.is_running() {
                        // Coalesce acknowledgements over a short window.
                        self.ack_delay.start(now, ACK_COALESCE);
                    }
                } else {
                    trace!(ns, "out-of-sequence I-frame");
                    actions.push(LinkAction::Transmit(
                        self.s_response(SFrame::Reject, poll),
                    ));
                }
                self.drain_pending(now, &mut actions);
            }
            Control::S {
                kind,
                nr,
                poll_final,
            } => {
                self.apply_ack(nr, now);
                match kind {
                    SFrame::ReceiveReady => {
                        if let State::Connected(e) = &mut self.state {
                            e.peer_busy = false;
                        }
                    }
                    SFrame::ReceiveNotReady => {
                        debug!("peer busy (RNR)");
                        if let State::Connected(e) = &mut self.state {
                            e.peer_busy = true;
                        }
                    }
                    SFrame::Reject => {
                        debug!(nr, "REJ received, retransmitting from N(R)");
                        let (retransmits, vr) = match &self.state {
                            State::Connected(e) => (
                                e.unacked
                                    .iter()
                                    .map(|o| (o.ns, o.payload.clone()))
                                    .collect::<Vec<_>>(),
                                e.vr,
                            ),
                            _ => return actions,
                        };
                        let any = !retransmits.is_empty();
                        for (ns, payload) in retransmits {
                            actions.push(LinkAction::Transmit(
                                self.i_frame(ns, vr, false, payload),
                            ));
                        }
                        if any {
                            self.t1.start(now, self.config.t1);
                        }
                    }
                }
                if poll_final && frame.command {
                    actions.push(LinkAction::Transmit(self.rr_response(true)));
                }
                self.drain_pending(now, &mut actions);
            }
            Control::U {
                kind: UFrame::Disc,
                poll_final,
            } => {
                let e = match std::mem::replace(&mut self.state, State::Disconnected) {
                    State::Connected(e) => e,
                    _ => return actions,
                };
                let ua =
                    Self::build_u(&self.local, &e.peer, &e.digis, UFrame::Ua, poll_final, false);
                self.enter_disconnected();
                actions.push(LinkAction::Transmit(ua));
                actions.push(LinkAction::Status(LinkStatus::PeerDisconnected {
                    peer: e.peer,
                }));
            }
            Control::U {
                kind: UFrame::Dm, ..
            } => {
                self.enter_disconnected();
                actions.push(LinkAction::Status(LinkStatus::PeerDisconnected { peer }));
            }
            Control::U {
                kind: UFrame::Frmr,
                ..
            } => {
                if self.config.frmr_fatal {
                    warn!(%peer, "FRMR received, dropping link");
                    actions.push(LinkAction::Status(LinkStatus::ProtocolError { peer }));
                    actions.extend(self.disconnect(now));
                } else {
                    warn!(%peer, "FRMR received, resetting counters");
                    if let State::Connected(e) = &mut self.state {
                        e.vs = 0;
                        e.vr = 0;
                        e.va = 0;
                        e.unacked.clear();
                        e.retries = 0;
                    }
                }
            }
            Control::U {
                kind: UFrame::Sabm | UFrame::Sabme,
                poll_final: true,
            } => {
                // Peer reset the link.
                debug!(%peer, "link reset by peer");
                self.enter_disconnected();
                actions.extend(self.accept_incoming_connect(frame, now));
            }
            Control::U { .. } => {
                trace!("unexpected U-frame in CONNECTED, dropped");
            }
        }
        actions
    }

    fn on_frame_releasing(&mut self, frame: &Ax25Frame) -> Vec<LinkAction> {
        let peer = match &self.state {
            State::Releasing(r) => r.peer,
            _ => return Vec::new(),
        };
        if *frame.source() != peer {
            return Vec::new();
        }

        match frame.control {
            Control::U {
                kind: UFrame::Ua | UFrame::Dm,
                ..
            } => {
                self.enter_disconnected();
                vec![LinkAction::Status(LinkStatus::Disconnected)]
            }
            Control::U {
                kind: UFrame::Disc,
                poll_final,
            } => {
                // Both ends disconnecting at once.
                let ua = {
                    let State::Releasing(r) = &self.state else {
                        return Vec::new();
                    };
                    Self::build_u(&self.local, &r.peer, &r.digis, UFrame::Ua, poll_final, false)
                };
                vec![LinkAction::Transmit(ua)]
            }
            _ => Vec::new(),
        }
    }

    // ------------------------------------------------------------------ //
    // Timers
    // ------------------------------------------------------------------ //

    /// Service expired timers. `pager_pending` suppresses the T3 keepalive;
    /// a suppressed T3 is paused, not cleared.
    pub fn on_timers(&mut self, now: Instant, pager_pending: bool) -> Vec<LinkAction> {
        let mut actions = Vec::new();

        if self.ack_delay.is_expired(now) {
            self.ack_delay.stop();
            if matches!(self.state, State::Connected(_)) {
                actions.push(LinkAction::Transmit(self.rr_response(false)));
            }
        }

        if self.t1.is_expired(now) {
            self.on_t1_expiry(now, &mut actions);
        }

        if self.t3.is_expired(now) {
            if pager_pending {
                // Hold the keepalive until the pager prompt is answered.
                self.t3.pause(now);
            } else {
                self.t3.stop();
                if matches!(self.state, State::Connected(_)) {
                    debug!("T3 expired, polling peer");
                    actions.push(LinkAction::Transmit(self.rr_command_poll()));
                    self.t1.start(now, self.config.t1);
                }
            }
        }

        actions
    }

    fn on_t1_expiry(&mut self, now: Instant, actions: &mut Vec<LinkAction>) {
        self.t1.stop();
        match &mut self.state {
            State::Connecting(c) => {
                if c.attempt < self.config.n2 {
                    c.attempt += 1;
                    c.sabme_outstanding = false;
                    let attempt = c.attempt;
                    let peer = c.peer;
                    let frame =
                        Self::build_u(&self.local, &c.peer, &c.digis, UFrame::Sabm, true, true);
                    self.t1.start(now, self.config.t1);
                    actions.push(LinkAction::Status(LinkStatus::Connecting {
                        peer,
                        attempt,
                        max_attempts: self.config.n2,
                    }));
                    actions.push(LinkAction::Transmit(frame));
                } else {
                    let peer = c.peer;
                    let attempts = self.config.n2;
                    debug!(%peer, attempts, "connect timed out");
                    self.enter_disconnected();
                    actions.push(LinkAction::Status(LinkStatus::ConnectTimedOut {
                        peer,
                        attempts,
                    }));
                }
            }
            State::Connected(e) => {
                e.retries += 1;
                if e.retries > self.config.n2 {
                    let peer = e.peer;
                    let attempts = self.config.n2;
                    warn!(%peer, attempts, "link lost");
                    self.enter_disconnected();
                    actions.push(LinkAction::Status(LinkStatus::LinkLost { peer, attempts }));
                    return;
                }
                // Timer recovery: repeat the oldest unacked frame as a poll,
                // or poll with RR when nothing is outstanding.
                let oldest = e.unacked.front().map(|o| (o.ns, o.payload.clone()));
                let vr = e.vr;
                match oldest {
                    Some((ns, payload)) => {
                        actions.push(LinkAction::Transmit(self.i_frame(ns, vr, true, payload)));
                    }
                    None => {
                        actions.push(LinkAction::Transmit(self.rr_command_poll()));
                    }
                }
                self.t1.start(now, self.config.t1);
            }
            State::Releasing(r) => {
                if r.attempt < self.config.n2 {
                    r.attempt += 1;
                    let frame =
                        Self::build_u(&self.local, &r.peer, &r.digis, UFrame::Disc, true, true);
                    self.t1.start(now, self.config.t1);
                    actions.push(LinkAction::Transmit(frame));
                } else {
                    // Give up waiting for UA; the link is gone either way.
                    self.enter_disconnected();
                    actions.push(LinkAction::Status(LinkStatus::Disconnected));
                }
            }
            State::Disconnected => {}
        }
    }

    // ------------------------------------------------------------------ //
    // Internals
    // ------------------------------------------------------------------ //

    fn enter_disconnected(&mut self) {
        self.state = State::Disconnected;
        self.t1.stop();
        self.t3.stop();
        self.ack_delay.stop();
    }

    /// Remove acknowledged frames, advance V(A), and manage T1/T3.
    fn apply_ack(&mut self, nr: u8, now: Instant) {
        let unacked_empty = {
            let State::Connected(e) = &mut self.state else {
                return;
            };
            if !seq::nr_valid(nr, e.va, e.vs) {
                debug!(nr, va = e.va, vs = e.vs, "implausible N(R) ignored");
                return;
            }

            while let Some(front) = e.unacked.front() {
                if seq::acknowledges(nr, front.ns, self.config.window_k) {
                    trace!(ns = front.ns, "acked");
                    e.unacked.pop_front();
                } else {
                    break;
                }
            }
            e.va = nr;
            e.retries = 0;
            e.unacked.is_empty()
        };

        if unacked_empty {
            self.t1.stop();
            if !self.t3.is_running() && !self.t3.is_paused() {
                self.t3.start(now, self.config.t3);
            }
        } else {
            self.t1.start(now, self.config.t1);
        }
    }

    /// Transmit or queue one I-frame payload, honoring the window and a
    /// busy peer.
    fn enqueue_info(&mut self, payload: Vec<u8>, now: Instant, actions: &mut Vec<LinkAction>) {
        let slot = {
            let State::Connected(e) = &mut self.state else {
                return;
            };
            if !e.peer_busy && seq::outstanding(e.vs, e.va) < self.config.window_k {
                let ns = e.vs;
                e.vs = seq::increment(e.vs);
                e.unacked.push_back(Outstanding {
                    ns,
                    payload: payload.clone(),
                });
                Some((ns, e.vr))
            } else {
                trace!("window closed, holding payload");
                e.pending.push_back(payload.clone());
                None
            }
        };

        if let Some((ns, nr)) = slot {
            // The I-frame's N(R) piggybacks any pending acknowledgement.
            self.ack_delay.stop();
            self.t3.stop();
            if !self.t1.is_running() {
                self.t1.start(now, self.config.t1);
            }
            actions.push(LinkAction::Transmit(self.i_frame(ns, nr, false, payload)));
        }
    }

    /// Flush held payloads while the window allows.
    fn drain_pending(&mut self, now: Instant, actions: &mut Vec<LinkAction>) {
        loop {
            let payload = {
                let State::Connected(e) = &mut self.state else {
                    return;
                };
                if e.peer_busy || seq::outstanding(e.vs, e.va) >= self.config.window_k {
                    return;
                }
                match e.pending.pop_front() {
                    Some(p) => p,
                    None => return,
                }
            };
            self.enqueue_info(payload, now, actions);
        }
    }

    // -- frame builders -- //

    fn build_u(
        local: &Callsign,
        peer: &Callsign,
        digis: &[Callsign],
        kind: UFrame,
        poll_final: bool,
        command: bool,
    ) -> Ax25Frame {
        let addresses = AddressField::new(
            *peer,
            *local,
            digis.iter().copied().map(Digipeater::new).collect(),
        );
        let control = Control::U { kind, poll_final };
        if command {
            Ax25Frame::command(addresses, control)
        } else {
            Ax25Frame::response(addresses, control)
        }
    }

    /// DM back along the sender's path, reversed, H bits cleared.
    fn dm_reply(&self, frame: &Ax25Frame, poll_final: bool) -> Ax25Frame {
        let digis: Vec<Callsign> = frame
            .addresses
            .digipeaters
            .iter()
            .rev()
            .map(|d| d.callsign)
            .collect();
        Self::build_u(
            &self.local,
            frame.source(),
            &digis,
            UFrame::Dm,
            poll_final,
            false,
        )
    }

    fn peer_path(&self) -> (Callsign, Vec<Callsign>) {
        match &self.state {
            State::Connecting(c) => (c.peer, c.digis.clone()),
            State::Connected(e) => (e.peer, e.digis.clone()),
            State::Releasing(r) => (r.peer, r.digis.clone()),
            State::Disconnected => (self.local, Vec::new()),
        }
    }

    fn current_vr(&self) -> u8 {
        match &self.state {
            State::Connected(e) => e.vr,
            _ => 0,
        }
    }

    fn s_frame(&self, kind: SFrame, poll_final: bool, command: bool) -> Ax25Frame {
        let (peer, digis) = self.peer_path();
        let addresses = AddressField::new(
            peer,
            self.local,
            digis.into_iter().map(Digipeater::new).collect(),
        );
        let control = Control::S {
            kind,
            nr: self.current_vr(),
            poll_final,
        };
        if command {
            Ax25Frame::command(addresses, control)
        } else {
            Ax25Frame::response(addresses, control)
        }
    }

    fn s_response(&self, kind: SFrame, poll_final: bool) -> Ax25Frame {
        self.s_frame(kind, poll_final, false)
    }

    fn rr_response(&self, final_bit: bool) -> Ax25Frame {
        self.s_frame(SFrame::ReceiveReady, final_bit, false)
    }

    fn rr_command_poll(&self) -> Ax25Frame {
        self.s_frame(SFrame::ReceiveReady, true, true)
    }

    fn i_frame(&self, ns: u8, nr: u8, poll: bool, payload: Vec<u8>) -> Ax25Frame {
        let (peer, digis) = self.peer_path();
        let addresses = AddressField::new(
            peer,
            self.local,
            digis.into_iter().map(Digipeater::new).collect(),
        );
        Ax25Frame::information(addresses, ns, nr, poll, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        s.parse().unwrap()
    }

    fn machine() -> LinkMachine {
        LinkMachine::new(call("KC3SMW-0"), LinkConfig::default())
    }

    fn transmits(actions: &[LinkAction]) -> Vec<&Ax25Frame> {
        actions
            .iter()
            .filter_map(|a| match a {
                LinkAction::Transmit(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    fn peer_frame(control: Control) -> Ax25Frame {
        let addrs = AddressField::new(call("KC3SMW-0"), call("KC3SMW-7"), vec![]);
        match control {
            Control::U {
                kind: UFrame::Ua | UFrame::Dm | UFrame::Frmr,
                ..
            } => Ax25Frame::response(addrs, control),
            Control::I { ns, nr, poll } => {
                Ax25Frame::information(addrs, ns, nr, poll, b"x".to_vec())
            }
            other => Ax25Frame::command(addrs, other),
        }
    }

    fn connected_machine(now: Instant) -> LinkMachine {
        let mut m = machine();
        let _ = m.connect(call("KC3SMW-7"), vec![], now);
        let _ = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Ua,
                poll_final: true,
            }),
            now,
        );
        assert!(m.is_connected());
        m
    }

    #[test]
    fn first_attempt_is_sabme() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.connect(call("KC3SMW-7"), vec![], now);
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::U {
                kind: UFrame::Sabme,
                poll_final: true
            }
        );
        assert!(frames[0].command);
        assert!(m.is_connecting());
    }

    #[test]
    fn dm_during_sabme_falls_back_without_spending_a_retry() {
        let now = Instant::now();
        let mut m = machine();
        let _ = m.connect(call("KC3SMW-7"), vec![], now);

        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Dm,
                poll_final: true,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::U {
                kind: UFrame::Sabm,
                poll_final: true
            }
        );
        assert!(m.is_connecting());

        // A second DM is a real refusal.
        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Dm,
                poll_final: true,
            }),
            now,
        );
        assert!(m.is_disconnected());
        assert!(actions.iter().any(|a| matches!(
            a,
            LinkAction::Status(LinkStatus::PeerRefused { .. })
        )));
    }

    #[test]
    fn keepalive_poll_after_t3() {
        let now = Instant::now();
        let mut m = connected_machine(now);

        let t3_fire = now + LinkConfig::default().t3;
        let actions = m.on_timers(t3_fire, false);
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::S {
                kind: SFrame::ReceiveReady,
                nr: 0,
                poll_final: true
            }
        );
        assert!(frames[0].command);
    }

    #[test]
    fn pager_pending_pauses_t3_instead_of_polling() {
        let now = Instant::now();
        let mut m = connected_machine(now);

        let t3_fire = now + LinkConfig::default().t3;
        let actions = m.on_timers(t3_fire, true);
        assert!(transmits(&actions).is_empty());
        assert!(m.keepalive_paused());

        // Long after the pager cleared, the resumed timer fires normally.
        let resumed = t3_fire + Duration::from_secs(600);
        m.resume_keepalive(resumed);
        let actions = m.on_timers(resumed, false);
        assert_eq!(transmits(&actions).len(), 1);
    }

    #[test]
    fn window_holds_fifth_frame_until_ack() {
        let now = Instant::now();
        let mut m = connected_machine(now);

        let mut sent = 0;
        for i in 0..5 {
            let actions = m.send_line(format!("line{i}\r").into_bytes(), now);
            sent += transmits(&actions).len();
        }
        // Window k=4: four on the wire, the fifth held.
        assert_eq!(sent, 4);
        let snap = m.snapshot();
        assert_eq!(snap.vs, 4);
        assert_eq!(snap.va, 0);

        // RR acking one frame releases the held payload.
        let actions = m.on_frame(
            &peer_frame(Control::S {
                kind: SFrame::ReceiveReady,
                nr: 1,
                poll_final: false,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::I {
                ns: 4,
                nr: 0,
                poll: false
            }
        );
    }

    #[test]
    fn rnr_marks_peer_busy_and_rr_clears_it() {
        let now = Instant::now();
        let mut m = connected_machine(now);

        let _ = m.on_frame(
            &peer_frame(Control::S {
                kind: SFrame::ReceiveNotReady,
                nr: 0,
                poll_final: false,
            }),
            now,
        );
        let actions = m.send_line(b"held\r".to_vec(), now);
        assert!(transmits(&actions).is_empty());

        let actions = m.on_frame(
            &peer_frame(Control::S {
                kind: SFrame::ReceiveReady,
                nr: 0,
                poll_final: false,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0].control, Control::I { ns: 0, .. }));
    }

    #[test]
    fn rej_retransmits_everything_outstanding() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        let _ = m.send_line(b"one\r".to_vec(), now);
        let _ = m.send_line(b"two\r".to_vec(), now);
        let _ = m.send_line(b"three\r".to_vec(), now);

        // Peer acks the first and rejects from N(S)=1.
        let actions = m.on_frame(
            &peer_frame(Control::S {
                kind: SFrame::Reject,
                nr: 1,
                poll_final: false,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0].control, Control::I { ns: 1, .. }));
        assert!(matches!(frames[1].control, Control::I { ns: 2, .. }));
        assert_eq!(frames[0].info, b"two\r");
        assert_eq!(frames[1].info, b"three\r");
    }

    #[test]
    fn t1_recovery_repolls_oldest_then_gives_up() {
        let now = Instant::now();
        let cfg = LinkConfig::default();
        let mut m = connected_machine(now);
        let _ = m.send_line(b"lost\r".to_vec(), now);

        let mut at = now;
        for _ in 0..cfg.n2 {
            at += cfg.t1;
            let actions = m.on_timers(at, false);
            let frames = transmits(&actions);
            assert_eq!(frames.len(), 1);
            assert_eq!(
                frames[0].control,
                Control::I {
                    ns: 0,
                    nr: 0,
                    poll: true
                }
            );
        }

        at += cfg.t1;
        let actions = m.on_timers(at, false);
        assert!(m.is_disconnected());
        assert!(actions
            .iter()
            .any(|a| matches!(a, LinkAction::Status(LinkStatus::LinkLost { .. }))));
    }

    #[test]
    fn incoming_sabm_is_answered_with_ua() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Sabm,
                poll_final: true,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::U {
                kind: UFrame::Ua,
                poll_final: true
            }
        );
        assert!(!frames[0].command);
        assert!(m.is_connected());
    }

    #[test]
    fn disc_while_disconnected_draws_dm() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Disc,
                poll_final: true,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::U {
                kind: UFrame::Dm,
                poll_final: true
            }
        );
        assert!(m.is_disconnected());
    }

    #[test]
    fn stray_i_frame_draws_dm_when_disconnected() {
        let now = Instant::now();
        let mut m = machine();
        let actions = m.on_frame(
            &peer_frame(Control::I {
                ns: 0,
                nr: 0,
                poll: false,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0].control,
            Control::U {
                kind: UFrame::Dm,
                ..
            }
        ));
    }

    #[test]
    fn frames_for_other_stations_are_ignored() {
        let now = Instant::now();
        let mut m = machine();
        let addrs = AddressField::new(call("N0TME-1"), call("KC3SMW-7"), vec![]);
        let frame = Ax25Frame::command(
            addrs,
            Control::U {
                kind: UFrame::Sabm,
                poll_final: true,
            },
        );
        assert!(m.on_frame(&frame, now).is_empty());
        assert!(m.is_disconnected());
    }

    #[test]
    fn ui_frames_delivered_in_any_state() {
        let now = Instant::now();
        let mut m = machine();
        let addrs = AddressField::new(call("CQ"), call("KC3SMW-7"), vec![]);
        let ui = Ax25Frame::unnumbered_information(addrs, b"hello net".to_vec());
        let actions = m.on_frame(&ui, now);
        assert!(matches!(
            &actions[..],
            [LinkAction::Deliver { info, pid: 0xF0, .. }] if info == b"hello net"
        ));
        assert!(m.is_disconnected());
    }

    #[test]
    fn frmr_fatal_sends_disc_and_surfaces_protocol_error() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Frmr,
                poll_final: false,
            }),
            now,
        );
        assert!(actions.iter().any(|a| matches!(
            a,
            LinkAction::Status(LinkStatus::ProtocolError { .. })
        )));
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0].control,
            Control::U {
                kind: UFrame::Disc,
                ..
            }
        ));
    }

    #[test]
    fn frmr_benign_resets_counters_when_configured() {
        let now = Instant::now();
        let cfg = LinkConfig {
            frmr_fatal: false,
            ..LinkConfig::default()
        };
        let mut m = LinkMachine::new(call("KC3SMW-0"), cfg);
        let _ = m.connect(call("KC3SMW-7"), vec![], now);
        let _ = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Ua,
                poll_final: true,
            }),
            now,
        );
        let _ = m.send_line(b"x\r".to_vec(), now);

        let actions = m.on_frame(
            &peer_frame(Control::U {
                kind: UFrame::Frmr,
                poll_final: false,
            }),
            now,
        );
        assert!(transmits(&actions).is_empty());
        assert!(m.is_connected());
        let snap = m.snapshot();
        assert_eq!((snap.vs, snap.vr, snap.va), (0, 0, 0));
    }

    #[test]
    fn implausible_nr_is_ignored() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        let _ = m.send_line(b"one\r".to_vec(), now);
        // V(A)=0, V(S)=1; N(R)=5 is outside the plausible range.
        let _ = m.on_frame(
            &peer_frame(Control::S {
                kind: SFrame::ReceiveReady,
                nr: 5,
                poll_final: false,
            }),
            now,
        );
        assert_eq!(m.snapshot().va, 0);
    }

    #[test]
    fn delayed_ack_fires_once() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        let _ = m.on_frame(
            &peer_frame(Control::I {
                ns: 0,
                nr: 0,
                poll: false,
            }),
            now,
        );

        let later = now + ACK_COALESCE;
        let actions = m.on_timers(later, false);
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::S {
                kind: SFrame::ReceiveReady,
                nr: 1,
                poll_final: false
            }
        );
        assert!(!frames[0].command);

        // Nothing further scheduled.
        assert!(m
            .on_timers(later + Duration::from_millis(200), false)
            .is_empty());
    }

    #[test]
    fn polled_i_frame_is_acked_immediately() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        let actions = m.on_frame(
            &peer_frame(Control::I {
                ns: 0,
                nr: 0,
                poll: true,
            }),
            now,
        );
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::S {
                kind: SFrame::ReceiveReady,
                nr: 1,
                poll_final: true
            }
        );
    }

    #[test]
    fn outbound_i_frame_piggybacks_pending_ack() {
        let now = Instant::now();
        let mut m = connected_machine(now);
        // Inbound I-frame schedules a delayed RR...
        let _ = m.on_frame(
            &peer_frame(Control::I {
                ns: 0,
                nr: 0,
                poll: false,
            }),
            now,
        );
        // ...which the outbound I-frame's N(R)=1 replaces.
        let actions = m.send_line(b"reply\r".to_vec(), now);
        let frames = transmits(&actions);
        assert_eq!(frames.len(), 1);
        assert_eq!(
            frames[0].control,
            Control::I {
                ns: 0,
                nr: 1,
                poll: false
            }
        );
        // The coalesce timer was cancelled.
        assert!(m
            .on_timers(now + ACK_COALESCE, false)
            .iter()
            .all(|a| !matches!(a, LinkAction::Transmit(_))));
    }
}
