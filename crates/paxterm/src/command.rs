//! Slash-command parsing.
//!
//! Only lines starting with `/` are commands; everything else is user text
//! routed by the session according to link state. Unrecognized commands are
//! returned as [`Command::Unknown`] so the session can forward them to the
//! peer while connected (node and BBS software has slash commands of its
//! own).

use paxterm_core::callsign::Callsign;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect {
        dest: Callsign,
        digis: Vec<Callsign>,
    },
    Disconnect,
    UnprotoOneShot {
        dest: Callsign,
        digis: Vec<Callsign>,
        message: String,
    },
    UnprotoEnter {
        dest: Callsign,
        digis: Vec<Callsign>,
    },
    UnprotoExit,
    /// `None` means "show the current value".
    Retries(Option<u32>),
    Echo(bool),
    Crlf(bool),
    Debug,
    Status,
    Clear,
    Help,
    Quit,
    /// Malformed invocation of a known command; shows usage.
    Usage(&'static str),
    /// Not a command we know; the raw line is kept for forwarding.
    Unknown(String),
}

/// Parse one input line. Returns `None` for plain text.
pub fn parse(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let head = tokens.next().unwrap_or_default().to_ascii_lowercase();
    let rest: Vec<&str> = tokens.collect();

    let cmd = match head.as_str() {
        "/c" | "/connect" => parse_connect(&rest),
        "/d" | "/disconnect" => Command::Disconnect,
        "/unproto" => parse_unproto(&rest),
        "/upexit" | "/ex" | "/upoff" | "/upstop" => Command::UnprotoExit,
        "/retries" => match rest.first() {
            None => Command::Retries(None),
            Some(n) => match n.parse::<u32>() {
                Ok(n) => Command::Retries(Some(n)),
                Err(_) => Command::Usage("Usage: /retries N  (1-10)"),
            },
        },
        "/echo" => parse_toggle(&rest, Command::Echo, "Usage: /echo on|off"),
        "/crlf" => parse_toggle(&rest, Command::Crlf, "Usage: /crlf on|off"),
        "/debug" => Command::Debug,
        "/status" => Command::Status,
        "/clear" | "/cls" => Command::Clear,
        "/h" | "/help" => Command::Help,
        "/q" | "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(trimmed.to_string()),
    };
    Some(cmd)
}

fn parse_toggle(
    rest: &[&str],
    build: fn(bool) -> Command,
    usage: &'static str,
) -> Command {
    match rest.first().map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("on") => build(true),
        Some("off") => build(false),
        _ => Command::Usage(usage),
    }
}

fn parse_connect(rest: &[&str]) -> Command {
    const USAGE: &str = "Usage: /connect CALL [via DIGI1,DIGI2]";

    let Some(dest) = rest.first() else {
        return Command::Usage(USAGE);
    };
    let Ok(dest) = dest.parse::<Callsign>() else {
        return Command::Usage(USAGE);
    };

    let digis = match rest.get(1) {
        Some(via) if via.eq_ignore_ascii_case("via") => match rest.get(2) {
            Some(list) => match parse_digi_list(list) {
                Some(digis) => digis,
                None => return Command::Usage(USAGE),
            },
            None => return Command::Usage(USAGE),
        },
        Some(_) => return Command::Usage(USAGE),
        None => Vec::new(),
    };

    Command::Connect { dest, digis }
}

fn parse_unproto(rest: &[&str]) -> Command {
    const USAGE: &str =
        "Usage: /unproto DEST [via DIGI1,DIGI2] [message...]  |  /unproto off";

    let Some(first) = rest.first() else {
        return Command::Usage(USAGE);
    };
    if matches!(
        first.to_ascii_lowercase().as_str(),
        "off" | "stop" | "end" | "exit"
    ) {
        return Command::UnprotoExit;
    }
    let Ok(dest) = first.parse::<Callsign>() else {
        return Command::Usage(USAGE);
    };

    let (digis, msg_start) = match rest.get(1) {
        Some(via) if via.eq_ignore_ascii_case("via") => match rest.get(2) {
            Some(list) => match parse_digi_list(list) {
                Some(digis) => (digis, 3),
                None => return Command::Usage(USAGE),
            },
            None => return Command::Usage(USAGE),
        },
        _ => (Vec::new(), 1),
    };

    if rest.len() > msg_start {
        Command::UnprotoOneShot {
            dest,
            digis,
            message: rest[msg_start..].join(" "),
        }
    } else {
        Command::UnprotoEnter { dest, digis }
    }
}

fn parse_digi_list(list: &str) -> Option<Vec<Callsign>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.trim().parse::<Callsign>().ok())
        .collect()
}
