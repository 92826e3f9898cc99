//! The DSL model
//!
//! Line-level instruction types, the in-memory form of a parsed test file,
//! and the shared wire types (controls, log entries) that cross the process
//! boundary to the shell substitute.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// How an actual string is compared against an expected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Exact equality after trailing-whitespace normalization
    Verbatim,
    /// Shell-style wildcard match over the whole string
    Glob,
    /// Regex, anchored to the full string
    Regex,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Verbatim => write!(f, "verbatim"),
            MatchMode::Glob => write!(f, "glob"),
            MatchMode::Regex => write!(f, "regex"),
        }
    }
}

/// The output channel a hijack response targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stdout,
    Stderr,
    Status,
    Command,
}

/// Strictness level for message/system reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    Strict,
    Relaxed,
}

/// A runtime directive
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Clear,
    End { buffer: Option<usize> },
    Messages(Option<Strictness>),
    System(Option<Strictness>),
}

/// A single parsed line of a test file.
///
/// `Comment` and `Continuation` never survive into a `TestFile` instruction
/// sequence: comments are dropped and continuations are folded into the
/// preceding instruction during parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// An empty source line. Blank lines reset the buffer walk position and
    /// close an open hijack; runs of three become an implicit `@clear`.
    Blank,
    /// An unindented line — documentation, ignored at execution time
    Comment(String),
    /// `> keys` — raw keystrokes for the editor
    KeyInput { text: String, delay: Option<f64> },
    /// `:cmd` — an ex-style command
    ExCommand { text: String, delay: Option<f64> },
    /// `% text` — sugar for entering insert mode, typing text, leaving
    BufferText { text: String, delay: Option<f64> },
    /// A buffer content expectation, one line of it
    BufferExpectation {
        text: String,
        buffer: Option<usize>,
        mode: Option<MatchMode>,
        /// Set for `& text` lines: match verbatim, no annotation parsing
        literal: bool,
    },
    /// `~ text` — an expected echoed message
    MessageExpectation { text: String, mode: Option<MatchMode> },
    /// `! text` — an expected system call
    SystemExpectation { text: String, mode: Option<MatchMode> },
    /// `$ text` — a faked response for a system call
    Hijack { response: String, channel: Option<Channel> },
    /// `|text` — appended to the previous instruction's text
    Continuation(String),
    /// `@clear`, `@end`, `@messages`, `@system`
    Directive(Directive),
    /// `@do name args…`
    MacroInvocation { name: String, args: Vec<String> },
}

/// An instruction paired with the source line it came from (1-based; for
/// continued instructions, the line of the last continuation).
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced {
    pub lineno: usize,
    pub inst: Instruction,
}

/// A macro definition: a named, positional-parameter instruction template.
///
/// The body is kept as raw source lines; invocation substitutes arguments
/// textually into a fresh copy and re-parses it, so a shared template is
/// never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub params: Vec<String>,
    /// (original line number, raw line text)
    pub body: Vec<(usize, String)>,
}

/// A parsed test file: the ordered top-level instructions plus the macros
/// defined in it. Created by the parser, consumed read-only.
#[derive(Debug, Clone)]
pub struct TestFile {
    pub path: PathBuf,
    pub instructions: Vec<Sourced>,
    pub macros: HashMap<String, Macro>,
}

/// One entry of the hijack queue, shared with the shell substitute through
/// the control mailbox. Carries an expectation (or accept-anything) and the
/// responses to inject per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Pattern a system call must satisfy; `None` accepts any command
    pub expectation: Option<String>,
    pub mode: MatchMode,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub status: Option<i32>,
    /// Closed controls no longer accept responses. A blank source line
    /// closes the open control; this never crosses the process boundary.
    #[serde(skip)]
    pub closed: bool,
}

impl Control {
    pub fn expecting(expectation: String, mode: MatchMode) -> Self {
        Self {
            expectation: Some(expectation),
            mode,
            command: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: None,
            closed: false,
        }
    }

    /// A control that matches any command, used for bare hijack lines.
    pub fn accept_any() -> Self {
        Self {
            expectation: None,
            mode: MatchMode::Regex,
            command: Vec::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            status: None,
            closed: false,
        }
    }

    /// Attach a response line to this control.
    pub fn respond(&mut self, line: &str, channel: Option<Channel>) -> Result<(), HarnessError> {
        match channel.unwrap_or(Channel::Stdout) {
            Channel::Command => self.command.push(line.to_string()),
            Channel::Stdout => self.stdout.push(line.to_string()),
            Channel::Stderr => self.stderr.push(line.to_string()),
            Channel::Status => {
                if self.status.is_some() {
                    return Err(HarnessError::syntax(
                        "a system call cannot return two statuses",
                    ));
                }
                let status: i32 = line.trim().parse().map_err(|_| {
                    HarnessError::syntax("returned status must be a number")
                })?;
                self.status = Some(status);
            }
        }
        Ok(())
    }

    /// Whether this control injects anything at all. A pure expectation
    /// lets the real command through unmodified.
    pub fn has_response(&self) -> bool {
        !self.command.is_empty()
            || !self.stdout.is_empty()
            || !self.stderr.is_empty()
            || self.status.is_some()
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref e) = self.expectation {
            writeln!(f, " EXPECT:\t{} ({} mode)", e, self.mode)?;
        }
        if !self.command.is_empty() {
            writeln!(f, "COMMAND:\t{}", self.command.join("\n\t"))?;
        }
        if !self.stdout.is_empty() {
            writeln!(f, " STDOUT:\t{}", self.stdout.join("\n\t"))?;
        }
        if !self.stderr.is_empty() {
            writeln!(f, " STDERR:\t{}", self.stderr.join("\n\t"))?;
        }
        if let Some(status) = self.status {
            writeln!(f, " STATUS:\t{}", status)?;
        }
        Ok(())
    }
}

/// One record of how the substitute resolved a system call. Appended to the
/// log mailbox, reconciled by the controller after each command block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEntry {
    /// The editor issued this command
    Received { command: String },
    /// The command satisfied a queued expectation
    Matched { expectation: String, mode: MatchMode },
    /// The substitute injected this response in the command's place
    Responded { response: String },
    /// No queued control matched
    Unexpected,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Received { command } => write!(f, "  RECEIVED {}", command),
            LogEntry::Matched { expectation, mode } => {
                write!(f, "   MATCHED with \"{}\" ({} mode)", expectation, mode)
            }
            LogEntry::Responded { response } => write!(f, " RESPONDED {}", response),
            LogEntry::Unexpected => write!(f, "UNEXPECTED"),
        }
    }
}

/// A failure captured inside the shell substitute, written to the error
/// mailbox and re-surfaced as a harness-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptError {
    pub message: String,
    /// The invocation that was being handled when the failure happened
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_status_must_be_numeric() {
        let mut c = Control::accept_any();
        assert!(c.respond("not-a-number", Some(Channel::Status)).is_err());
        assert!(c.respond("3", Some(Channel::Status)).is_ok());
        assert_eq!(c.status, Some(3));
    }

    #[test]
    fn test_control_rejects_second_status() {
        let mut c = Control::accept_any();
        c.respond("0", Some(Channel::Status)).unwrap();
        assert!(c.respond("1", Some(Channel::Status)).is_err());
    }

    #[test]
    fn test_control_default_channel_is_stdout() {
        let mut c = Control::expecting("echo hi".into(), MatchMode::Regex);
        c.respond("faked", None).unwrap();
        assert_eq!(c.stdout, vec!["faked"]);
        assert!(c.has_response());
    }

    #[test]
    fn test_pure_expectation_has_no_response() {
        let c = Control::expecting("make test".into(), MatchMode::Verbatim);
        assert!(!c.has_response());
    }

    #[test]
    fn test_log_entry_round_trip() {
        let entries = vec![
            LogEntry::Received { command: "echo hi".into() },
            LogEntry::Matched { expectation: "echo .*".into(), mode: MatchMode::Regex },
            LogEntry::Responded { response: "faked".into() },
            LogEntry::Unexpected,
        ];
        let json = serde_json::to_string(&entries).unwrap();
        let back: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
        assert_eq!(entries, back);
    }
}
