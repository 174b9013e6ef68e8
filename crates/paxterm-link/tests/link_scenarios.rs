//! End-to-end link machine scenarios, driven with synthetic clocks.
//!
//! Each test plays one side of a session: user operations and harness frames
//! go in, and the transmitted frames and surfaced status events are checked
//! against the expected wire exchange.

use std::time::{Duration, Instant};

use paxterm_core::address::AddressField;
use paxterm_core::callsign::Callsign;
use paxterm_core::control::{Control, SFrame, UFrame};
use paxterm_core::frame::Ax25Frame;
use paxterm_link::{LinkAction, LinkConfig, LinkMachine, LinkStatus};

fn call(s: &str) -> Callsign {
    s.parse().unwrap()
}

fn mycall() -> Callsign {
    call("KC3SMW-0")
}

fn peer() -> Callsign {
    call("KC3SMW-7")
}

fn machine() -> LinkMachine {
    LinkMachine::new(mycall(), LinkConfig::default())
}

fn from_peer(control: Control, info: &[u8]) -> Ax25Frame {
    let addrs = AddressField::new(mycall(), peer(), vec![]);
    match control {
        Control::I { ns, nr, poll } => {
            Ax25Frame::information(addrs, ns, nr, poll, info.to_vec())
        }
        Control::U {
            kind: UFrame::Ua | UFrame::Dm | UFrame::Frmr,
            ..
        } => Ax25Frame::response(addrs, control),
        other => Ax25Frame::command(addrs, other),
    }
}

fn ua() -> Ax25Frame {
    from_peer(
        Control::U {
            kind: UFrame::Ua,
            poll_final: true,
        },
        &[],
    )
}

fn transmitted(actions: &[LinkAction]) -> Vec<Ax25Frame> {
    actions
        .iter()
        .filter_map(|a| match a {
            LinkAction::Transmit(f) => Some(f.clone()),
            _ => None,
        })
        .collect()
}

fn statuses(actions: &[LinkAction]) -> Vec<LinkStatus> {
    actions
        .iter()
        .filter_map(|a| match a {
            LinkAction::Status(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Scenario 1: clean connect and disconnect.
#[test]
fn clean_connect_disconnect() {
    let now = Instant::now();
    let mut m = machine();

    // /c KC3SMW-7 -> SABME with P=1, src and dst as configured.
    let actions = m.connect(peer(), vec![], now);
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(*frames[0].destination(), peer());
    assert_eq!(*frames[0].source(), mycall());
    assert_eq!(
        frames[0].control,
        Control::U {
            kind: UFrame::Sabme,
            poll_final: true
        }
    );

    // Harness UA (F=1) -> connected surfaced.
    let actions = m.on_frame(&ua(), now);
    assert!(statuses(&actions)
        .iter()
        .any(|s| matches!(s, LinkStatus::Connected { peer: p } if *p == peer())));
    assert!(m.is_connected());

    // /d -> DISC with P=1.
    let actions = m.disconnect(now);
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].control,
        Control::U {
            kind: UFrame::Disc,
            poll_final: true
        }
    );

    // Harness UA -> disconnected surfaced.
    let actions = m.on_frame(&ua(), now);
    assert!(statuses(&actions)
        .iter()
        .any(|s| matches!(s, LinkStatus::Disconnected)));
    assert!(m.is_disconnected());
}

/// Scenario 2: connect with retries; exactly one SABME then one SABM.
#[test]
fn connect_retries_then_times_out() {
    let now = Instant::now();
    let cfg = LinkConfig::default();
    let mut m = machine();
    assert_eq!(m.set_retries(2), 2);

    let actions = m.connect(peer(), vec![], now);
    let mut sabme = 0;
    let mut sabm = 0;
    let mut count = |frames: &[Ax25Frame]| {
        for f in frames {
            match f.control {
                Control::U {
                    kind: UFrame::Sabme,
                    ..
                } => sabme += 1,
                Control::U {
                    kind: UFrame::Sabm,
                    ..
                } => sabm += 1,
                _ => {}
            }
        }
    };
    count(&transmitted(&actions));

    // First T1 expiry: retry as SABM.
    let t1 = now + cfg.t1;
    count(&transmitted(&m.on_timers(t1, false)));
    assert!(m.is_connecting());

    // Second T1 expiry: budget of 2 exhausted.
    let t2 = t1 + cfg.t1;
    let actions = m.on_timers(t2, false);
    count(&transmitted(&actions));
    assert!(statuses(&actions).iter().any(|s| matches!(
        s,
        LinkStatus::ConnectTimedOut { attempts: 2, .. }
    )));
    assert!(m.is_disconnected());

    assert_eq!(sabme, 1);
    assert_eq!(sabm, 1);
}

/// Scenario 3: I-frame exchange with piggybacked acknowledgement.
#[test]
fn i_frame_exchange() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    // User types "hello" (terminal appends the CR).
    let actions = m.send_line(b"hello\r".to_vec(), now);
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].control,
        Control::I {
            ns: 0,
            nr: 0,
            poll: false
        }
    );
    assert_eq!(frames[0].pid, Some(0xF0));
    assert_eq!(frames[0].info, b"hello\r");

    // Harness replies with its own I-frame acking ours.
    let actions = m.on_frame(
        &from_peer(
            Control::I {
                ns: 0,
                nr: 1,
                poll: false,
            },
            b"hi\r",
        ),
        now,
    );
    assert!(actions
        .iter()
        .any(|a| matches!(a, LinkAction::Deliver { info, .. } if info == b"hi\r")));

    let snap = m.snapshot();
    assert_eq!(snap.vr, 1);
    assert_eq!(snap.va, 1);
}

/// Scenario 4: out-of-order reception recovers via REJ.
#[test]
fn out_of_order_recovery() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    // N(S)=1 arrives first: REJ with N(R)=0, payload discarded.
    let actions = m.on_frame(
        &from_peer(
            Control::I {
                ns: 1,
                nr: 0,
                poll: false,
            },
            b"second\r",
        ),
        now,
    );
    assert!(!actions
        .iter()
        .any(|a| matches!(a, LinkAction::Deliver { .. })));
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].control,
        Control::S {
            kind: SFrame::Reject,
            nr: 0,
            poll_final: false
        }
    );

    // The in-sequence frame is accepted...
    let actions = m.on_frame(
        &from_peer(
            Control::I {
                ns: 0,
                nr: 0,
                poll: false,
            },
            b"first\r",
        ),
        now,
    );
    assert!(actions
        .iter()
        .any(|a| matches!(a, LinkAction::Deliver { info, .. } if info == b"first\r")));

    // ...and so is the retransmission of the one that jumped the queue.
    let actions = m.on_frame(
        &from_peer(
            Control::I {
                ns: 1,
                nr: 0,
                poll: false,
            },
            b"second\r",
        ),
        now,
    );
    assert!(actions
        .iter()
        .any(|a| matches!(a, LinkAction::Deliver { info, .. } if info == b"second\r")));
    assert_eq!(m.snapshot().vr, 2);
}

/// Scenario 5: UNPROTO one-shot leaves link state untouched.
#[test]
fn unproto_one_shot() {
    let m = machine();
    let frame = m.unproto(call("CQ"), &[call("WIDE1-1")], b"CQ CQ de KC3SMW".to_vec());

    assert_eq!(*frame.destination(), call("CQ"));
    assert_eq!(*frame.source(), mycall());
    assert_eq!(frame.addresses.digipeaters.len(), 1);
    assert_eq!(frame.addresses.digipeaters[0].callsign, call("WIDE1-1"));
    assert!(!frame.addresses.digipeaters[0].repeated);
    assert_eq!(
        frame.control,
        Control::U {
            kind: UFrame::Ui,
            poll_final: false
        }
    );
    assert_eq!(frame.pid, Some(0xF0));
    assert_eq!(frame.info, b"CQ CQ de KC3SMW");
    assert!(m.is_disconnected());
}

/// Scenario 6: lines typed during the handshake flush after UA.
#[test]
fn queued_line_flushes_after_ua() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);

    // "HELP" typed before the UA arrives: nothing on the wire yet.
    let actions = m.send_line(b"HELP\r".to_vec(), now);
    assert!(transmitted(&actions).is_empty());

    // UA arrives: exactly one I-frame with N(S)=0 carrying the queued line.
    let actions = m.on_frame(&ua(), now + Duration::from_millis(300));
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].control,
        Control::I {
            ns: 0,
            nr: 0,
            poll: false
        }
    );
    assert_eq!(frames[0].info, b"HELP\r");
}

/// Invariant: (V(S) - V(A)) mod 8 never exceeds k.
#[test]
fn window_invariant_holds_under_load() {
    let now = Instant::now();
    let cfg = LinkConfig::default();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    let mut acked = 0u8;
    for i in 0..32 {
        let _ = m.send_line(format!("line {i}\r").into_bytes(), now);
        let snap = m.snapshot();
        let outstanding = snap.vs.wrapping_sub(snap.va) % 8;
        assert!(outstanding <= cfg.window_k, "window exceeded: {outstanding}");

        if i % 3 == 0 {
            // Ack one frame at a time.
            acked = (acked + 1) % 8;
            let _ = m.on_frame(
                &from_peer(
                    Control::S {
                        kind: SFrame::ReceiveReady,
                        nr: acked,
                        poll_final: false,
                    },
                    &[],
                ),
                now,
            );
        }
    }
}

/// Invariant: payloads stay queued until an N(R) passes their N(S).
#[test]
fn no_phantom_acks() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    let _ = m.send_line(b"kept\r".to_vec(), now);
    // An RR that merely repeats N(R)=0 acknowledges nothing.
    let _ = m.on_frame(
        &from_peer(
            Control::S {
                kind: SFrame::ReceiveReady,
                nr: 0,
                poll_final: false,
            },
            &[],
        ),
        now,
    );

    // T1 recovery still retransmits the payload: it was never released.
    let actions = m.on_timers(now + LinkConfig::default().t1, false);
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].info, b"kept\r");
}

/// Invariant: double disconnect reaches the same state with one DISC.
#[test]
fn idempotent_disconnect() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    let first = m.disconnect(now);
    assert_eq!(transmitted(&first).len(), 1);

    let second = m.disconnect(now);
    assert!(transmitted(&second).is_empty());

    // Peer's UA lands the machine in DISCONNECTED either way.
    let _ = m.on_frame(&ua(), now);
    assert!(m.is_disconnected());
}

/// Invariant: a pending pager suppresses keepalives for longer than T3.
#[test]
fn pager_suppresses_keepalives() {
    let now = Instant::now();
    let cfg = LinkConfig::default();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    // Sweep well past T3 with the pager flag held: nothing transmits.
    let mut at = now;
    for _ in 0..10 {
        at += cfg.t3 / 4;
        assert!(transmitted(&m.on_timers(at, true)).is_empty());
    }
    assert!(m.keepalive_paused());

    // Once the pager clears, the keepalive comes back.
    m.resume_keepalive(at);
    let actions = m.on_timers(at + cfg.t3, false);
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert!(matches!(
        frames[0].control,
        Control::S {
            kind: SFrame::ReceiveReady,
            poll_final: true,
            ..
        }
    ));
}

/// Disconnect while still awaiting UA abandons the attempt without a DISC.
#[test]
fn disconnect_during_handshake() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);

    let actions = m.disconnect(now);
    assert!(transmitted(&actions).is_empty());
    assert!(m.is_disconnected());
}

/// DISC retransmits up to n2, then the release completes unconditionally.
#[test]
fn release_gives_up_after_n2() {
    let now = Instant::now();
    let cfg = LinkConfig::default();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);
    let _ = m.disconnect(now);

    let mut at = now;
    let mut discs = 0;
    for _ in 0..cfg.n2 + 2 {
        at += cfg.t1;
        let actions = m.on_timers(at, false);
        discs += transmitted(&actions)
            .iter()
            .filter(|f| {
                matches!(
                    f.control,
                    Control::U {
                        kind: UFrame::Disc,
                        ..
                    }
                )
            })
            .count();
        if m.is_disconnected() {
            break;
        }
    }
    // The initial DISC plus n2-1 retransmissions.
    assert_eq!(discs as u32, cfg.n2 - 1);
    assert!(m.is_disconnected());
}

/// Peer-initiated DISC is answered with UA and surfaced.
#[test]
fn peer_disc_surfaced() {
    let now = Instant::now();
    let mut m = machine();
    let _ = m.connect(peer(), vec![], now);
    let _ = m.on_frame(&ua(), now);

    let actions = m.on_frame(
        &from_peer(
            Control::U {
                kind: UFrame::Disc,
                poll_final: true,
            },
            &[],
        ),
        now,
    );
    let frames = transmitted(&actions);
    assert_eq!(frames.len(), 1);
    assert_eq!(
        frames[0].control,
        Control::U {
            kind: UFrame::Ua,
            poll_final: true
        }
    );
    assert!(statuses(&actions)
        .iter()
        .any(|s| matches!(s, LinkStatus::PeerDisconnected { .. })));
    assert!(m.is_disconnected());
}
