//! Echoed-message reconciliation
//!
//! The editor only exposes its message history as one accumulated list, and
//! may drop old entries, so "what did the last command echo" has to be
//! guessed by aligning the before and after snapshots.

use crate::error::{ErrorKind, HarnessError};
use crate::matcher;
use crate::model::{MatchMode, Strictness};

/// Guess which messages in a message list are new.
///
/// The editor can drop messages after as few as twenty, so the old list may
/// survive only as a suffix-to-prefix overlap with the new one.
pub fn guess_new_messages(old: &[String], new: &[String]) -> Vec<String> {
    for i in 0..old.len() {
        let tail = &old[i..];
        if new.len() >= tail.len() && &new[..tail.len()] == tail {
            return new[tail.len()..].to_vec();
        }
    }
    new.to_vec()
}

/// Whether a message list starts with vim's built-in `:messages` header.
fn starts_with_builtin(messages: &[String]) -> bool {
    messages.len() >= 2
        && messages[0].is_empty()
        && messages[1] == "Messages maintainer: Bram Moolenaar <Bram@vim.org>"
}

fn strip_builtin(messages: &[String]) -> &[String] {
    &messages[2..]
}

/// Reconcile the messages echoed by one command block against its
/// expectations. Returns the reconciliation log and all failures, never
/// stopping at the first.
pub fn verify(
    old: &[String],
    new: &[String],
    expectations: &[(String, Option<MatchMode>)],
    strictness: Strictness,
) -> (Vec<String>, Vec<HarnessError>) {
    let (old, new) = if starts_with_builtin(old) && starts_with_builtin(new) {
        (strip_builtin(old), strip_builtin(new))
    } else {
        (old, new)
    };
    let mut unread: Vec<String> = guess_new_messages(old, new);
    let mut log: Vec<String> = Vec::new();
    let mut failures: Vec<HarnessError> = Vec::new();

    for message in &unread {
        log.push(format!("message received: {}", message));
    }

    let unexpected = |message: &str, log: &mut Vec<String>, failures: &mut Vec<HarnessError>| {
        log.push(format!("message unexpected: {}", message));
        if strictness == Strictness::Strict {
            failures.push(HarnessError::assertion(format!(
                "unexpected message: {}",
                message
            )));
        }
    };

    for (desired, mode) in expectations {
        let mode = mode.unwrap_or(MatchMode::Verbatim);
        loop {
            if unread.is_empty() {
                failures.push(HarnessError::assertion(format!(
                    "expected message not received: \"{}\" ({} mode)",
                    desired, mode
                )));
                break;
            }
            let message = unread.remove(0);
            match matcher::matches(&message, desired, mode) {
                Ok(true) => {
                    log.push(format!("message matched: \"{}\" ({} mode)", desired, mode));
                    break;
                }
                Ok(false) => unexpected(&message, &mut log, &mut failures),
                Err(e) => {
                    failures.push(HarnessError::new(ErrorKind::Assertion, e.message));
                    break;
                }
            }
        }
    }
    for remaining in unread {
        unexpected(&remaining, &mut log, &mut failures);
    }

    (log, failures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msgs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_guess_new_messages_overlap() {
        assert_eq!(
            guess_new_messages(&msgs(&["1", "2", "3", "4"]), &msgs(&["1", "2", "3", "4", "5", "6"])),
            msgs(&["5", "6"])
        );
        assert_eq!(
            guess_new_messages(&msgs(&["1", "2", "3", "4"]), &msgs(&["4", "5", "6", "7"])),
            msgs(&["5", "6", "7"])
        );
        assert_eq!(
            guess_new_messages(&msgs(&["1", "2", "3", "4"]), &msgs(&["5", "6", "7"])),
            msgs(&["5", "6", "7"])
        );
        assert_eq!(
            guess_new_messages(&msgs(&["1", "2", "3", "4"]), &msgs(&["4", "1", "2", "3"])),
            msgs(&["1", "2", "3"])
        );
    }

    #[test]
    fn test_expected_message_matches() {
        let (_, failures) = verify(
            &[],
            &msgs(&["Hello, world!"]),
            &[("Hello, world!".into(), None)],
            Strictness::Relaxed,
        );
        assert!(failures.is_empty());
    }

    #[test]
    fn test_expected_message_missing() {
        let (_, failures) = verify(
            &[],
            &[],
            &[("never echoed".into(), None)],
            Strictness::Relaxed,
        );
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("expected message not received"));
    }

    #[test]
    fn test_unexpected_message_relaxed_vs_strict() {
        let (_, relaxed) = verify(&[], &msgs(&["noise"]), &[], Strictness::Relaxed);
        assert!(relaxed.is_empty());

        let (_, strict) = verify(&[], &msgs(&["noise"]), &[], Strictness::Strict);
        assert_eq!(strict.len(), 1);
        assert!(strict[0].message.contains("unexpected message"));
    }

    #[test]
    fn test_glob_mode_expectation() {
        let (_, failures) = verify(
            &[],
            &msgs(&["ERROR(nope): bad"]),
            &[("ERROR(*): *".into(), Some(MatchMode::Glob))],
            Strictness::Relaxed,
        );
        assert!(failures.is_empty());
    }

    #[test]
    fn test_builtin_header_is_stripped() {
        let header = msgs(&["", "Messages maintainer: Bram Moolenaar <Bram@vim.org>"]);
        let mut new = header.clone();
        new.push("Hello".into());
        let (_, failures) = verify(
            &header,
            &new,
            &[("Hello".into(), None)],
            Strictness::Strict,
        );
        assert!(failures.is_empty());
    }
}
