//! Optional TOML configuration for the terminal.
//!
//! Everything here has a default; a config file only needs the sections it
//! wants to change. Positional command-line arguments override file values.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use paxterm_link::LinkConfig;

use crate::error::TermError;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct TermConfig {
    #[serde(default)]
    pub kiss: KissSection,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub terminal: TerminalSection,
}

impl TermConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, TermError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TermError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, TermError> {
        toml::from_str(s).map_err(|e| TermError::Config(format!("failed to parse config: {e}")))
    }
}

/// The `[kiss]` section: where the TNC lives.
#[derive(Debug, Deserialize)]
pub struct KissSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

impl Default for KissSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The `[link]` section: LAPB retry and timer knobs.
#[derive(Debug, Deserialize)]
pub struct LinkSection {
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_t1_ms")]
    pub t1_ms: u64,
    #[serde(default = "default_t3_ms")]
    pub t3_ms: u64,
    #[serde(default = "default_window")]
    pub window: u8,
    #[serde(default = "default_frmr_fatal")]
    pub frmr_fatal: bool,
}

fn default_retries() -> u32 {
    3
}

fn default_t1_ms() -> u64 {
    4_000
}

fn default_t3_ms() -> u64 {
    180_000
}

fn default_window() -> u8 {
    4
}

fn default_frmr_fatal() -> bool {
    true
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            t1_ms: default_t1_ms(),
            t3_ms: default_t3_ms(),
            window: default_window(),
            frmr_fatal: default_frmr_fatal(),
        }
    }
}

impl LinkSection {
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            n2: self.retries,
            t1: Duration::from_millis(self.t1_ms),
            t3: Duration::from_millis(self.t3_ms),
            window_k: self.window,
            frmr_fatal: self.frmr_fatal,
        }
        .clamped()
    }
}

/// The `[terminal]` section: line discipline toggles.
#[derive(Debug, Deserialize)]
pub struct TerminalSection {
    #[serde(default = "default_echo")]
    pub echo: bool,
    #[serde(default)]
    pub crlf: bool,
}

fn default_echo() -> bool {
    true
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            echo: default_echo(),
            crlf: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_gets_defaults() {
        let cfg = TermConfig::parse("").unwrap();
        assert_eq!(cfg.kiss.host, "127.0.0.1");
        assert_eq!(cfg.kiss.port, 8001);
        assert_eq!(cfg.link.retries, 3);
        assert_eq!(cfg.link.window, 4);
        assert!(cfg.terminal.echo);
        assert!(!cfg.terminal.crlf);
    }

    #[test]
    fn partial_sections_fill_in() {
        let cfg = TermConfig::parse(
            r#"
            [kiss]
            port = 8010

            [link]
            retries = 5
            t1_ms = 2500
            "#,
        )
        .unwrap();
        assert_eq!(cfg.kiss.host, "127.0.0.1");
        assert_eq!(cfg.kiss.port, 8010);
        let link = cfg.link.to_link_config();
        assert_eq!(link.n2, 5);
        assert_eq!(link.t1, Duration::from_millis(2500));
        assert_eq!(link.t3, Duration::from_millis(180_000));
    }

    #[test]
    fn out_of_range_link_values_are_clamped() {
        let cfg = TermConfig::parse(
            r#"
            [link]
            retries = 99
            window = 12
            "#,
        )
        .unwrap();
        let link = cfg.link.to_link_config();
        assert_eq!(link.n2, 10);
        assert_eq!(link.window_k, 7);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(TermConfig::parse("not = [valid").is_err());
    }
}
