//! Command-line surface.
//!
//! Accepted forms:
//!
//! ```text
//! paxterm MYCALL
//! paxterm MYCALL TARGET
//! paxterm MYCALL TARGET HOST
//! paxterm MYCALL TARGET HOST PORT
//! paxterm MYCALL TARGET HOST:PORT
//! paxterm MYCALL HOST:PORT
//! ```
//!
//! Whether the second token is a connect target or a host is decided the
//! same way operators type them: host names contain a dot, a colon, or are
//! literally `localhost`.

use std::path::PathBuf;

use clap::Parser;

use paxterm_core::callsign::Callsign;

use crate::error::TermError;

#[derive(Debug, Parser)]
#[command(name = "paxterm", about = "Interactive KISS/AX.25 packet terminal", version)]
pub struct Cli {
    /// Your station callsign, e.g. KC3SMW-7
    pub mycall: Callsign,

    /// Optional: TARGET to auto-connect, then HOST and PORT (or HOST:PORT)
    #[arg(value_name = "TARGET|HOST[:PORT] ...", num_args = 0..=3)]
    pub rest: Vec<String>,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

/// The CLI after the positional heuristics have been applied.
#[derive(Debug, PartialEq, Eq)]
pub struct Invocation {
    pub target: Option<Callsign>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

fn looks_like_host(s: &str) -> bool {
    s == "localhost" || s.contains('.') || s.contains(':')
}

impl Cli {
    /// Interpret the free-form positionals.
    pub fn invocation(&self) -> Result<Invocation, TermError> {
        let mut target = None;
        let mut host = None;
        let mut port = None;

        let mut args = self.rest.iter().peekable();

        if let Some(first) = args.peek() {
            if !looks_like_host(first) && first.parse::<u16>().is_err() {
                let call = first
                    .parse::<Callsign>()
                    .map_err(|e| TermError::Argument(format!("invalid TARGET {first:?}: {e}")))?;
                target = Some(call);
                args.next();
            }
        }

        if let Some(hp) = args.next() {
            if let Some((h, p)) = hp.split_once(':') {
                if !h.is_empty() {
                    host = Some(h.to_string());
                }
                port = Some(p.parse::<u16>().map_err(|_| {
                    TermError::Argument(format!("invalid port in {hp:?}"))
                })?);
            } else if looks_like_host(hp) {
                host = Some(hp.clone());
            } else if let Ok(p) = hp.parse::<u16>() {
                port = Some(p);
            } else {
                return Err(TermError::Argument(format!(
                    "expected HOST, HOST:PORT, or PORT, got {hp:?}"
                )));
            }
        }

        if let Some(p) = args.next() {
            if port.is_some() {
                return Err(TermError::Argument(format!("unexpected argument {p:?}")));
            }
            port = Some(
                p.parse::<u16>()
                    .map_err(|_| TermError::Argument(format!("invalid PORT {p:?}")))?,
            );
        }

        Ok(Invocation { target, host, port })
    }
}
