//! Harness errors

use std::fmt;

/// The kind of harness error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed test file — fatal to that file, nothing is sent to the editor
    Syntax,
    /// Expected vs. actual mismatch — collected, execution continues
    Assertion,
    /// A system call arrived with no matching hijack while strict
    UnexpectedCall,
    /// Transport unreachable, editor died, mailbox unreadable, etc. —
    /// aborts the remaining instructions of the current file
    Harness,
    /// Macro invocation re-entered itself past the depth bound
    Recursion,
    /// Failure raised inside the disposable shell substitute, surfaced
    /// from the error mailbox
    Interception,
    /// IO error
    Io,
}

/// A harness error with file/line context
#[derive(Debug, Clone)]
pub struct HarnessError {
    pub kind: ErrorKind,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
}

impl HarnessError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_location(mut self, file: impl Into<String>, line: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn syntax(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, msg)
    }

    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, msg)
    }

    pub fn harness(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Harness, msg)
    }

    pub fn interception(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Interception, msg)
    }

    /// Whether this error aborts the remaining instructions of the file.
    /// Assertion-level problems never do; everything else does.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind, ErrorKind::Assertion | ErrorKind::UnexpectedCall)
    }
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
        }
        if let Some(line) = self.line {
            write!(f, "{}:", line)?;
        }
        if self.file.is_some() || self.line.is_some() {
            write!(f, " ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HarnessError {}

impl From<std::io::Error> for HarnessError {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_location() {
        let e = HarnessError::syntax("unrecognized directive \"nope\"")
            .with_location("basic.vroom", 12);
        assert_eq!(e.to_string(), "basic.vroom:12: unrecognized directive \"nope\"");
    }

    #[test]
    fn test_assertion_is_not_fatal() {
        assert!(!HarnessError::assertion("mismatch").is_fatal());
        assert!(!HarnessError::new(ErrorKind::UnexpectedCall, "x").is_fatal());
        assert!(HarnessError::harness("editor died").is_fatal());
        assert!(HarnessError::syntax("bad line").is_fatal());
    }
}
