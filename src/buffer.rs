//! Buffer expectation tracking
//!
//! Keeps the harness's walk position through the editor's buffers. Each
//! buffer expectation line advances the walk one line and compares it;
//! `@end` asserts the walk consumed the whole buffer; blank source lines
//! and `@clear` rewind to the top.

use similar::TextDiff;

use crate::error::HarnessError;
use crate::matcher;
use crate::model::MatchMode;
use crate::transport::EditorTransport;

/// Tracks which buffer is loaded and how far it has been verified.
pub struct BufferTracker {
    loaded: bool,
    buffer: Option<usize>,
    data: Vec<String>,
    /// Index of the last verified line; `None` before the first check
    line: Option<usize>,
    /// The expectation texts walked so far, for diff rendering on failure
    expected_so_far: Vec<String>,
}

impl BufferTracker {
    pub fn new() -> Self {
        Self {
            loaded: false,
            buffer: None,
            data: Vec::new(),
            line: None,
            expected_so_far: Vec::new(),
        }
    }

    /// Forget the loaded buffer; the next check reloads and starts at the
    /// top. Blank source lines land here.
    pub fn unload(&mut self) {
        self.loaded = false;
        self.buffer = None;
        self.data.clear();
        self.line = None;
        self.expected_so_far.clear();
    }

    /// Load buffer contents through the transport. With no explicit buffer
    /// requested, an already-loaded buffer stays put; otherwise the active
    /// buffer is fetched.
    fn load(
        &mut self,
        transport: &mut dyn EditorTransport,
        buffer: Option<usize>,
    ) -> Result<(), HarnessError> {
        if self.loaded && buffer.is_none() {
            return Ok(());
        }
        self.unload();
        self.data = transport.buffer_lines(buffer)?;
        self.buffer = buffer;
        self.loaded = true;
        Ok(())
    }

    /// Verify the next line of the buffer against one expectation line.
    ///
    /// Assertion failures carry the buffer id, the 0-based differing line
    /// index, and the expected and actual text; the walk still advances so
    /// later expectation lines keep checking their own positions.
    pub fn verify_line(
        &mut self,
        transport: &mut dyn EditorTransport,
        text: &str,
        buffer: Option<usize>,
        mode: Option<MatchMode>,
    ) -> Result<(), HarnessError> {
        self.load(transport, buffer)?;
        let mode = mode.unwrap_or(MatchMode::Verbatim);
        let index = self.line.map_or(0, |l| l + 1);
        self.line = Some(index);
        self.expected_so_far.push(text.to_string());

        let Some(actual) = self.data.get(index) else {
            return Err(HarnessError::assertion(format!(
                "unexpected end of buffer {}: line {}: expected \"{}\", got nothing\n{}",
                self.buffer_name(),
                index,
                text,
                self.render_diff(),
            )));
        };
        if !matcher::matches(actual, text, mode)? {
            return Err(HarnessError::assertion(format!(
                "buffer {} mismatch: line {}: expected \"{}\" ({} mode), got \"{}\"\n{}",
                self.buffer_name(),
                index,
                text,
                mode,
                actual,
                self.render_diff(),
            )));
        }
        Ok(())
    }

    /// Assert the walk has compared through the buffer's final line.
    pub fn ensure_at_end(
        &mut self,
        transport: &mut dyn EditorTransport,
        buffer: Option<usize>,
    ) -> Result<(), HarnessError> {
        self.load(transport, buffer)?;
        match self.line {
            None => {
                // A freshly cleared buffer passes trivially.
                if self.data.is_empty() || self.data == [""] {
                    Ok(())
                } else {
                    Err(HarnessError::assertion(
                        "misuse of @end: buffer has not been checked yet",
                    ))
                }
            }
            Some(line) if line + 1 != self.data.len() => {
                Err(HarnessError::assertion(format!(
                    "expected end of buffer {} after line {}, but it has {} lines\n{}",
                    self.buffer_name(),
                    line,
                    self.data.len(),
                    self.render_diff(),
                )))
            }
            Some(_) => Ok(()),
        }
    }

    fn buffer_name(&self) -> String {
        match self.buffer {
            Some(n) => n.to_string(),
            None => "(active)".to_string(),
        }
    }

    /// Unified diff of the expectations walked so far against the actual
    /// buffer contents, for failure reports.
    fn render_diff(&self) -> String {
        let expected = join_lines(&self.expected_so_far);
        let actual = join_lines(&self.data);
        TextDiff::from_lines(&expected, &actual)
            .unified_diff()
            .header("expected", "buffer")
            .to_string()
    }
}

impl Default for BufferTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn join_lines(lines: &[String]) -> String {
    let mut joined = lines.join("\n");
    if !joined.is_empty() {
        joined.push('\n');
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::FakeTransport;

    #[test]
    fn test_walk_matches_in_order() {
        let mut transport = FakeTransport::with_buffer(vec!["Hello, world!", "Second line"]);
        let mut tracker = BufferTracker::new();
        tracker
            .verify_line(&mut transport, "Hello, world!", None, None)
            .unwrap();
        tracker
            .verify_line(&mut transport, "Second line", None, None)
            .unwrap();
        tracker.ensure_at_end(&mut transport, None).unwrap();
    }

    #[test]
    fn test_mismatch_reports_line_and_both_sides() {
        let mut transport = FakeTransport::with_buffer(vec![""]);
        let mut tracker = BufferTracker::new();
        let err = tracker
            .verify_line(&mut transport, "Hello, world!", None, None)
            .unwrap_err();
        assert!(err.message.contains("line 0"));
        assert!(err.message.contains("expected \"Hello, world!\""));
        assert!(err.message.contains("got \"\""));
    }

    #[test]
    fn test_walk_advances_past_a_failure() {
        let mut transport = FakeTransport::with_buffer(vec!["wrong", "right"]);
        let mut tracker = BufferTracker::new();
        assert!(tracker.verify_line(&mut transport, "expected", None, None).is_err());
        // The next expectation checks line 1, not line 0 again.
        tracker.verify_line(&mut transport, "right", None, None).unwrap();
    }

    #[test]
    fn test_too_few_buffer_lines() {
        let mut transport = FakeTransport::with_buffer(vec!["only line"]);
        let mut tracker = BufferTracker::new();
        tracker.verify_line(&mut transport, "only line", None, None).unwrap();
        let err = tracker
            .verify_line(&mut transport, "missing line", None, None)
            .unwrap_err();
        assert!(err.message.contains("unexpected end of buffer"));
    }

    #[test]
    fn test_end_without_checks_on_fresh_buffer() {
        let mut transport = FakeTransport::with_buffer(vec![""]);
        let mut tracker = BufferTracker::new();
        tracker.ensure_at_end(&mut transport, None).unwrap();
    }

    #[test]
    fn test_end_without_checks_on_dirty_buffer() {
        let mut transport = FakeTransport::with_buffer(vec!["content"]);
        let mut tracker = BufferTracker::new();
        assert!(tracker.ensure_at_end(&mut transport, None).is_err());
    }

    #[test]
    fn test_end_with_unchecked_tail() {
        let mut transport = FakeTransport::with_buffer(vec!["one", "two"]);
        let mut tracker = BufferTracker::new();
        tracker.verify_line(&mut transport, "one", None, None).unwrap();
        let err = tracker.ensure_at_end(&mut transport, None).unwrap_err();
        assert!(err.message.contains("expected end of buffer"));
    }

    #[test]
    fn test_glob_mode_line() {
        let mut transport = FakeTransport::with_buffer(vec!["ERROR(x): boom"]);
        let mut tracker = BufferTracker::new();
        tracker
            .verify_line(&mut transport, "ERROR(*): *", None, Some(MatchMode::Glob))
            .unwrap();
    }
}
