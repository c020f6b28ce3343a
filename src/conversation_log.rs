//! Plain-text conversation transcript
//!
//! One file per day (`chatlog-YYYY-MM-DD.txt`) holding `You:` and `AI:`
//! lines. Write failures are logged and never interrupt a conversation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{Local, NaiveDate};

/// Line written at startup to separate sessions
const SEPARATOR_WIDTH: usize = 40;

/// Appends transcript lines to the daily log file
#[derive(Debug)]
pub struct ConversationLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl ConversationLog {
    /// Log into `dir`, creating it on first write
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `date`
    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("chatlog-{}.txt", date.format("%Y-%m-%d")))
    }

    /// Append one line to today's file
    pub fn append(&self, text: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let path = self.path_for(Local::now().date_naive());

        if let Err(e) = write_line(&self.dir, &path, text) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write conversation log");
        }
    }

    /// Mark the start of a session
    pub fn separator(&self) {
        self.append(&"_".repeat(SEPARATOR_WIDTH));
    }
}

fn write_line(dir: &Path, path: &Path, text: &str) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{text}")
}
