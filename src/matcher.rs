//! Pattern matching for expectations
//!
//! Stateless and total: evaluates whether an actual string satisfies an
//! expected pattern under a match mode. Invalid regexes are reported as
//! syntax errors at the point of use, never a panic.

use crate::error::HarnessError;
use crate::model::MatchMode;

/// Checks whether `actual` satisfies `expected` under `mode`.
///
/// Verbatim compares for equality after trimming trailing whitespace from
/// both sides. Glob uses shell-style wildcards over the whole string.
/// Regex must match the full string, not merely a substring.
pub fn matches(actual: &str, expected: &str, mode: MatchMode) -> Result<bool, HarnessError> {
    match mode {
        MatchMode::Verbatim => {
            Ok(actual.trim_end() == expected.trim_end())
        }
        MatchMode::Glob => {
            let pattern = glob::Pattern::new(expected).map_err(|e| {
                HarnessError::syntax(format!("invalid glob \"{}\": {}", expected, e))
            })?;
            Ok(pattern.matches(actual))
        }
        MatchMode::Regex => {
            let re = compile_anchored(expected)?;
            Ok(re.is_match(actual))
        }
    }
}

/// Like [`matches`], but an absent pattern accepts anything. Used by
/// hijacks that respond to arbitrary commands.
pub fn matches_opt(
    actual: &str,
    expected: Option<&str>,
    mode: MatchMode,
) -> Result<bool, HarnessError> {
    match expected {
        Some(pattern) => matches(actual, pattern, mode),
        None => Ok(true),
    }
}

/// Compile a pattern anchored to the full string, with a size limit to keep
/// pathological patterns from stalling the run.
pub fn compile_anchored(pattern: &str) -> Result<regex::Regex, HarnessError> {
    regex::RegexBuilder::new(&format!("^(?:{})$", pattern))
        .size_limit(1 << 20)
        .build()
        .map_err(|e| HarnessError::syntax(format!("invalid regex \"{}\": {}", pattern, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbatim_equality() {
        let s = "The quick brown fox jumped over the lazy dog.";
        assert!(matches(s, s, MatchMode::Verbatim).unwrap());
        assert!(!matches(s, "Something else", MatchMode::Verbatim).unwrap());
    }

    #[test]
    fn test_verbatim_ignores_trailing_whitespace() {
        assert!(matches("hello  ", "hello", MatchMode::Verbatim).unwrap());
        assert!(matches("hello", "hello\t", MatchMode::Verbatim).unwrap());
        assert!(!matches("  hello", "hello", MatchMode::Verbatim).unwrap());
    }

    #[test]
    fn test_glob_wildcards() {
        assert!(matches("anything", "*", MatchMode::Glob).unwrap());
        assert!(matches("ab", "a?", MatchMode::Glob).unwrap());
        assert!(!matches("abc", "a?", MatchMode::Glob).unwrap());
        let sentence = "The quick brown fox jumped over the lazy dog.";
        assert!(matches(sentence, "The * fox * the ???? *", MatchMode::Glob).unwrap());
    }

    #[test]
    fn test_regex_requires_full_match() {
        assert!(matches("abc", "a.c", MatchMode::Regex).unwrap());
        assert!(!matches("xabcy", "a.c", MatchMode::Regex).unwrap());
        assert!(matches("abc def", "abc .*", MatchMode::Regex).unwrap());
    }

    #[test]
    fn test_regex_with_alternation_stays_anchored() {
        // The non-capturing group keeps `a|b` from matching only half the string
        assert!(!matches("xa", "a|b", MatchMode::Regex).unwrap());
        assert!(matches("b", "a|b", MatchMode::Regex).unwrap());
    }

    #[test]
    fn test_invalid_regex_is_an_error_not_a_panic() {
        assert!(matches("x", "(unclosed", MatchMode::Regex).is_err());
    }

    #[test]
    fn test_absent_pattern_accepts_anything() {
        assert!(matches_opt("rm -rf /tmp/x", None, MatchMode::Regex).unwrap());
        assert!(!matches_opt("ls", Some("pwd"), MatchMode::Verbatim).unwrap());
    }
}
