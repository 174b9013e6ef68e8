//! Session transcript written alongside the terminal display.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;

/// Appends every displayed line to `session-YYYYMMDD-HHMMSS.log` in the
/// working directory.
pub struct SessionLog {
    file: File,
    path: PathBuf,
}

impl SessionLog {
    /// Create a fresh log file stamped with the local time.
    pub fn create() -> std::io::Result<Self> {
        let path = PathBuf::from(
            Local::now()
                .format("session-%Y%m%d-%H%M%S.log")
                .to_string(),
        );
        let file = File::create(&path)?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one line. Logging failures never disturb the session.
    pub fn line(&mut self, text: &str) {
        let _ = writeln!(self.file, "{text}");
    }
}
