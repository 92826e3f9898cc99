//! File mailboxes
//!
//! The harness and the disposable shell substitute share no memory; they
//! communicate through three files holding serialized collections (the log,
//! the control queue, and captured substitute errors). Writes go to a temp
//! file in the same directory and are renamed into place so a reader never
//! observes a half-written collection.

use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::HarnessError;
use crate::model::{Control, InterceptError, LogEntry};

/// Environment variable naming the log mailbox file.
pub const LOG_FILE_VAR: &str = "EDSPEC_LOG_FILE";
/// Environment variable naming the control mailbox file.
pub const CONTROL_FILE_VAR: &str = "EDSPEC_CONTROL_FILE";
/// Environment variable naming the error mailbox file.
pub const ERROR_FILE_VAR: &str = "EDSPEC_ERROR_FILE";
/// Environment variable naming the real shell the substitute delegates to.
pub const SHELL_VAR: &str = "EDSPEC_SHELL";

/// A serialized ordered collection living in a file.
pub struct Mailbox<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Mailbox<T> {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), _marker: PhantomData }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole collection.
    pub fn load(&self) -> Result<Vec<T>, HarnessError> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            HarnessError::harness(format!(
                "cannot read mailbox {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            HarnessError::harness(format!(
                "corrupt mailbox {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Replace the whole collection, atomically.
    pub fn store(&self, items: &[T]) -> Result<(), HarnessError> {
        let data = serde_json::to_string(items).map_err(|e| {
            HarnessError::harness(format!("cannot serialize mailbox: {}", e))
        })?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            HarnessError::harness(format!("cannot create mailbox temp file: {}", e))
        })?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| {
            HarnessError::harness(format!(
                "cannot replace mailbox {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Append entries to the collection.
    pub fn extend(&self, extra: Vec<T>) -> Result<(), HarnessError> {
        let mut items = self.load()?;
        items.extend(extra);
        self.store(&items)
    }
}

/// The three mailboxes of one harness run.
pub struct MailboxSet {
    pub log: Mailbox<LogEntry>,
    pub control: Mailbox<Control>,
    pub error: Mailbox<InterceptError>,
}

impl MailboxSet {
    /// Allocate fresh, empty mailboxes in `dir`. Harness side.
    pub fn create_in(dir: &Path) -> Result<Self, HarnessError> {
        let set = Self {
            log: Mailbox::at(dir.join("log.json")),
            control: Mailbox::at(dir.join("control.json")),
            error: Mailbox::at(dir.join("error.json")),
        };
        set.log.store(&[])?;
        set.control.store(&[])?;
        set.error.store(&[])?;
        Ok(set)
    }

    /// Locate the mailboxes from the environment. Substitute side.
    pub fn from_env() -> Result<Self, HarnessError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                HarnessError::interception(format!("{} is not set", name))
            })
        };
        Ok(Self {
            log: Mailbox::at(var(LOG_FILE_VAR)?),
            control: Mailbox::at(var(CONTROL_FILE_VAR)?),
            error: Mailbox::at(var(ERROR_FILE_VAR)?),
        })
    }

    /// The environment the editor must run under so that each of its system
    /// calls can find the mailboxes.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        vec![
            (LOG_FILE_VAR.into(), self.log.path().display().to_string()),
            (CONTROL_FILE_VAR.into(), self.control.path().display().to_string()),
            (ERROR_FILE_VAR.into(), self.error.path().display().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchMode;

    #[test]
    fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let set = MailboxSet::create_in(dir.path()).unwrap();
        assert_eq!(set.log.load().unwrap(), vec![]);

        set.log
            .extend(vec![LogEntry::Received { command: "ls".into() }])
            .unwrap();
        set.log.extend(vec![LogEntry::Unexpected]).unwrap();
        assert_eq!(
            set.log.load().unwrap(),
            vec![
                LogEntry::Received { command: "ls".into() },
                LogEntry::Unexpected,
            ]
        );
    }

    #[test]
    fn test_control_queue_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let set = MailboxSet::create_in(dir.path()).unwrap();
        let control = Control::expecting("echo .*".into(), MatchMode::Regex);
        set.control.store(&[control.clone()]).unwrap();
        assert_eq!(set.control.load().unwrap(), vec![control]);
    }

    #[test]
    fn test_corrupt_mailbox_is_harness_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.json");
        std::fs::write(&path, "[{\"type\":").unwrap();
        let mailbox: Mailbox<LogEntry> = Mailbox::at(&path);
        let err = mailbox.load().unwrap_err();
        assert!(err.message.contains("corrupt mailbox"));
    }

    #[test]
    fn test_missing_mailbox_is_harness_error() {
        let mailbox: Mailbox<LogEntry> = Mailbox::at("/nonexistent/log.json");
        assert!(mailbox.load().is_err());
    }
}
