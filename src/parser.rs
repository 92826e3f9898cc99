//! Test file parser
//!
//! Converts the textual test language into an ordered instruction sequence:
//! - action lines are indented two spaces; unindented lines are comments
//! - a trailing ` (words)` block annotates the line (delay, buffer number,
//!   match mode, output channel, strictness); ` (&text)` escapes a literal
//!   trailing parenthesis
//! - `|` continuation lines append to the previous instruction's text,
//!   preserving line breaks
//! - three consecutive blank lines are sugar for `@clear`
//! - `@macro name params…` captures raw lines until `@endmacro` into a
//!   reusable template; `@do name args…` invokes one

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::HarnessError;
use crate::model::{
    Directive, Instruction, Macro, MatchMode, Sourced, Strictness, TestFile,
};

/// The number of consecutive blank lines that equate to a `@clear`.
const BLANK_LINE_CLEAR_COMBO: usize = 3;

/// Annotation words an instruction kind accepts, in precedence order.
#[derive(Clone, Copy)]
enum Option_ {
    Delay,
    Buffer,
    Mode,
    Channel,
    Strictness,
}

/// Parsed annotation words for one line.
#[derive(Debug, Default, PartialEq)]
struct Controls {
    delay: Option<f64>,
    buffer: Option<usize>,
    mode: Option<MatchMode>,
    channel: Option<crate::model::Channel>,
    strictness: Option<Strictness>,
}

/// Parse a whole test file.
pub fn parse(text: &str, path: impl Into<PathBuf>) -> Result<TestFile, HarnessError> {
    let path = path.into();
    let lines: Vec<(usize, String)> = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.to_string()))
        .collect();
    let (instructions, macros) = parse_stream(&lines, true)?;

    // Invocation arity is checked up front so a bad call count never makes
    // it to the editor.
    for sourced in &instructions {
        if let Instruction::MacroInvocation { name, args } = &sourced.inst {
            check_invocation(&macros, name, args, sourced.lineno)?;
        }
    }

    Ok(TestFile { path, instructions, macros })
}

/// Parse a macro body fragment (after substitution). Uses the body's
/// original line numbers; macro definitions are not allowed here.
pub fn parse_fragment(lines: &[(usize, String)]) -> Result<Vec<Sourced>, HarnessError> {
    let (instructions, _) = parse_stream(lines, false)?;
    Ok(instructions)
}

/// Validate a `@do` against a macro table.
pub fn check_invocation(
    macros: &HashMap<String, Macro>,
    name: &str,
    args: &[String],
    lineno: usize,
) -> Result<(), HarnessError> {
    match macros.get(name) {
        None => Err(HarnessError::syntax(format!("@do of undefined macro \"{}\"", name))
            .with_line(lineno)),
        Some(mac) if mac.params.len() != args.len() => Err(HarnessError::syntax(format!(
            "macro \"{}\" takes {} argument(s), got {}",
            name,
            mac.params.len(),
            args.len()
        ))
        .with_line(lineno)),
        Some(_) => Ok(()),
    }
}

fn parse_stream(
    lines: &[(usize, String)],
    allow_macro_defs: bool,
) -> Result<(Vec<Sourced>, HashMap<String, Macro>), HarnessError> {
    let mut instructions: Vec<Sourced> = Vec::new();
    let mut macros: HashMap<String, Macro> = HashMap::new();
    let mut pending: Option<Sourced> = None;
    let mut blank_run = 0usize;
    // (definition under construction, line the @macro appeared on)
    let mut capture: Option<(Macro, usize)> = None;

    for (lineno, raw) in lines {
        let lineno = *lineno;
        let line = raw.trim_end_matches('\n');

        // Macro capture holds raw lines; only the fences are interpreted.
        if capture.is_some() {
            let trimmed = line.trim();
            if trimmed == "@endmacro" {
                if let Some((mac, _)) = capture.take() {
                    if macros.contains_key(&mac.name) {
                        return Err(HarnessError::syntax(format!(
                            "macro \"{}\" is already defined",
                            mac.name
                        ))
                        .with_line(lineno));
                    }
                    macros.insert(mac.name.clone(), mac);
                }
            } else if trimmed.starts_with("@macro") {
                return Err(
                    HarnessError::syntax("macro definitions cannot nest").with_line(lineno)
                );
            } else if let Some((ref mut mac, _)) = capture {
                mac.body.push((lineno, line.to_string()));
            }
            continue;
        }
        if let Some(rest) = macro_fence(line, "@macro") {
            if !allow_macro_defs {
                return Err(HarnessError::syntax(
                    "macro definitions are not allowed inside a macro body",
                )
                .with_line(lineno));
            }
            let mut words = rest.split_whitespace();
            let name = words.next().ok_or_else(|| {
                HarnessError::syntax("@macro needs a name").with_line(lineno)
            })?;
            capture = Some((
                Macro {
                    name: name.to_string(),
                    params: words.map(str::to_string).collect(),
                    body: Vec::new(),
                },
                lineno,
            ));
            continue;
        }
        if line.trim() == "@endmacro" && line.starts_with("  ") {
            return Err(HarnessError::syntax("@endmacro without @macro").with_line(lineno));
        }

        let inst = classify(line).map_err(|e| e.with_line(lineno))?;
        match inst {
            // Comments are dropped; they break blank-line combos but do not
            // flush a pending instruction.
            Instruction::Comment(_) => {
                blank_run = 0;
            }
            Instruction::Continuation(text) => match pending {
                Some(ref mut p) => {
                    append_continuation(&mut p.inst, &text).map_err(|e| e.with_line(lineno))?;
                    p.lineno = lineno;
                }
                None => {
                    return Err(
                        HarnessError::syntax("no instruction to continue").with_line(lineno)
                    );
                }
            },
            Instruction::Blank => {
                if let Some(p) = pending.take() {
                    instructions.push(p);
                }
                blank_run += 1;
                if blank_run == BLANK_LINE_CLEAR_COMBO {
                    instructions.push(Sourced {
                        lineno,
                        inst: Instruction::Directive(Directive::Clear),
                    });
                } else {
                    instructions.push(Sourced { lineno, inst: Instruction::Blank });
                }
            }
            inst => {
                if let Some(p) = pending.take() {
                    instructions.push(p);
                }
                blank_run = 0;
                pending = Some(Sourced { lineno, inst });
            }
        }
    }

    if let Some((mac, open_line)) = capture {
        return Err(
            HarnessError::syntax(format!("macro \"{}\" has no @endmacro", mac.name))
                .with_line(open_line),
        );
    }
    if let Some(p) = pending.take() {
        instructions.push(p);
    }
    Ok((instructions, macros))
}

fn macro_fence<'a>(line: &'a str, fence: &str) -> Option<&'a str> {
    let trimmed = line.strip_prefix("  ")?;
    let rest = trimmed.strip_prefix(fence)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix(' ')
    }
}

/// Classify a single physical line. Stateless: continuation folding, blank
/// combos, and macro fences are the caller's business.
fn classify(line: &str) -> Result<Instruction, HarnessError> {
    if line.trim().is_empty() {
        return Ok(Instruction::Blank);
    }
    if !line.starts_with("  ") {
        return Ok(Instruction::Comment(line.to_string()));
    }
    if let Some(rest) = line.strip_prefix("  |") {
        return Ok(Instruction::Continuation(rest.to_string()));
    }

    // `@clear` and literal expectations never carry an annotation block, so
    // they are recognized before the control split.
    if line == "  @clear" {
        return Ok(Instruction::Directive(Directive::Clear));
    }
    if let Some(rest) = line.strip_prefix("  & ") {
        return Ok(Instruction::BufferExpectation {
            text: rest.to_string(),
            buffer: None,
            mode: None,
            literal: true,
        });
    }
    if line == "  &" {
        return Ok(Instruction::BufferExpectation {
            text: String::new(),
            buffer: None,
            mode: None,
            literal: true,
        });
    }
    if let Some(rest) = line.strip_prefix("  @do ") {
        let mut words = rest.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| HarnessError::syntax("@do needs a macro name"))?;
        return Ok(Instruction::MacroInvocation {
            name: name.to_string(),
            args: words.map(str::to_string).collect(),
        });
    }

    let (line, controls) = split_controls(line);

    if let Some(directive) = line.strip_prefix("  @") {
        return match directive {
            "clear" => Ok(Instruction::Directive(Directive::Clear)),
            "end" => {
                let c = parse_controls(controls.as_deref(), &[Option_::Buffer])?;
                Ok(Instruction::Directive(Directive::End { buffer: c.buffer }))
            }
            "messages" => {
                let c = parse_controls(controls.as_deref(), &[Option_::Strictness])?;
                Ok(Instruction::Directive(Directive::Messages(c.strictness)))
            }
            "system" => {
                let c = parse_controls(controls.as_deref(), &[Option_::Strictness])?;
                Ok(Instruction::Directive(Directive::System(c.strictness)))
            }
            "do" => Err(HarnessError::syntax("@do needs a macro name")),
            other => Err(HarnessError::syntax(format!(
                "unrecognized directive \"{}\"",
                other
            ))),
        };
    }

    if let Some(rest) = line.strip_prefix("  > ") {
        let c = parse_controls(controls.as_deref(), &[Option_::Delay])?;
        return Ok(Instruction::KeyInput { text: rest.to_string(), delay: c.delay });
    }
    if let Some(rest) = line.strip_prefix("  % ") {
        let c = parse_controls(controls.as_deref(), &[Option_::Delay])?;
        return Ok(Instruction::BufferText { text: rest.to_string(), delay: c.delay });
    }
    if let Some(rest) = line.strip_prefix("  :") {
        let c = parse_controls(controls.as_deref(), &[Option_::Delay])?;
        return Ok(Instruction::ExCommand { text: rest.to_string(), delay: c.delay });
    }
    if let Some(rest) = line.strip_prefix("  ~ ") {
        let c = parse_controls(controls.as_deref(), &[Option_::Mode])?;
        return Ok(Instruction::MessageExpectation { text: rest.to_string(), mode: c.mode });
    }
    if let Some(rest) = line.strip_prefix("  ! ") {
        let c = parse_controls(controls.as_deref(), &[Option_::Mode])?;
        return Ok(Instruction::SystemExpectation { text: rest.to_string(), mode: c.mode });
    }
    if let Some(rest) = line.strip_prefix("  $ ") {
        let c = parse_controls(controls.as_deref(), &[Option_::Channel])?;
        return Ok(Instruction::Hijack { response: rest.to_string(), channel: c.channel });
    }

    // Anything else indented is a buffer expectation.
    let c = parse_controls(controls.as_deref(), &[Option_::Buffer, Option_::Mode])?;
    Ok(Instruction::BufferExpectation {
        text: line[2..].to_string(),
        buffer: c.buffer,
        mode: c.mode,
        literal: false,
    })
}

/// Split the trailing annotation block off a line.
///
/// `  > hello (2s)` becomes `("  > hello", Some("2s"))`; a `(&text)` block
/// unescapes to a literal `(text)` with no annotation.
fn split_controls(line: &str) -> (String, Option<String>) {
    if let Some(open) = line.rfind(" (") {
        let block = &line[open + 2..];
        if let Some(inner) = block.strip_suffix(')') {
            if !inner.contains(')') {
                if let Some(escaped) = inner.strip_prefix('&') {
                    return (format!("{} ({})", &line[..open], escaped), None);
                }
                let ok = !inner.is_empty()
                    && inner
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || " ._-".contains(ch));
                if ok {
                    return (line[..open].to_string(), Some(inner.trim().to_string()));
                }
            }
        }
    }
    (line.to_string(), None)
}

fn parse_controls(controls: Option<&str>, allowed: &[Option_]) -> Result<Controls, HarnessError> {
    let mut out = Controls::default();
    let Some(controls) = controls else {
        return Ok(out);
    };
    'word: for word in controls.split_whitespace() {
        for option in allowed {
            match option {
                Option_::Delay => {
                    if let Some(delay) = delay_word(word) {
                        if out.delay.is_some() {
                            return Err(duplicated("delay", word));
                        }
                        out.delay = Some(delay);
                        continue 'word;
                    }
                }
                Option_::Buffer => {
                    if let Ok(n) = word.parse::<usize>() {
                        if out.buffer.is_some() {
                            return Err(duplicated("buffer", word));
                        }
                        out.buffer = Some(n);
                        continue 'word;
                    }
                }
                Option_::Mode => {
                    let mode = match word {
                        "verbatim" => Some(MatchMode::Verbatim),
                        "glob" => Some(MatchMode::Glob),
                        "regex" => Some(MatchMode::Regex),
                        _ => None,
                    };
                    if let Some(mode) = mode {
                        if out.mode.is_some() {
                            return Err(duplicated("mode", word));
                        }
                        out.mode = Some(mode);
                        continue 'word;
                    }
                }
                Option_::Channel => {
                    use crate::model::Channel;
                    let channel = match word {
                        "stdout" => Some(Channel::Stdout),
                        "stderr" => Some(Channel::Stderr),
                        "status" => Some(Channel::Status),
                        "command" => Some(Channel::Command),
                        _ => None,
                    };
                    if let Some(channel) = channel {
                        if out.channel.is_some() {
                            return Err(duplicated("channel", word));
                        }
                        out.channel = Some(channel);
                        continue 'word;
                    }
                }
                Option_::Strictness => {
                    let strictness = match word {
                        "STRICT" => Some(Strictness::Strict),
                        "RELAXED" => Some(Strictness::Relaxed),
                        _ => None,
                    };
                    if let Some(s) = strictness {
                        if out.strictness.is_some() {
                            return Err(duplicated("strictness", word));
                        }
                        out.strictness = Some(s);
                        continue 'word;
                    }
                }
            }
        }
        return Err(HarnessError::syntax(format!(
            "unrecognized control word \"{}\"",
            word
        )));
    }
    Ok(out)
}

fn duplicated(option: &str, word: &str) -> HarnessError {
    HarnessError::syntax(format!("duplicated {} control \"{}\"", option, word))
}

/// `2`, `2.5`, `2s`, and `2.5s` are all delays, in seconds.
fn delay_word(word: &str) -> Option<f64> {
    let digits = word.strip_suffix('s').unwrap_or(word);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    digits.parse().ok()
}

fn append_continuation(inst: &mut Instruction, text: &str) -> Result<(), HarnessError> {
    let target = match inst {
        Instruction::KeyInput { text, .. }
        | Instruction::ExCommand { text, .. }
        | Instruction::BufferText { text, .. }
        | Instruction::BufferExpectation { text, .. }
        | Instruction::MessageExpectation { text, .. }
        | Instruction::SystemExpectation { text, .. } => text,
        Instruction::Hijack { response, .. } => response,
        _ => {
            return Err(HarnessError::syntax(
                "this instruction cannot be continued",
            ));
        }
    };
    target.push('\n');
    target.push_str(text);
    Ok(())
}

/// Substitute macro arguments into a template string.
///
/// Placeholders are written `$name` or `${name}` where `name` is one of the
/// macro's parameters, bound positionally to the invocation arguments.
/// Dollar signs that do not start a known parameter pass through untouched.
pub fn substitute(template: &str, params: &[String], args: &[String]) -> String {
    debug_assert_eq!(params.len(), args.len());
    let mut result = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        if chars.peek() == Some(&'{') {
            let rest: String = chars.clone().collect();
            if let Some(close) = rest.find('}') {
                let name = &rest[1..close];
                if let Some(i) = params.iter().position(|p| p == name) {
                    result.push_str(&args[i]);
                    for _ in 0..close + 1 {
                        chars.next();
                    }
                    continue;
                }
            }
            result.push('$');
            continue;
        }
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                chars.next();
            } else {
                break;
            }
        }
        if let Some(i) = params.iter().position(|p| *p == name) {
            result.push_str(&args[i]);
        } else {
            result.push('$');
            result.push_str(&name);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Channel;

    fn classify_ok(line: &str) -> Instruction {
        classify(line).unwrap()
    }

    #[test]
    fn test_comment_and_blank() {
        assert_eq!(classify_ok("This is a comment."), Instruction::Comment("This is a comment.".into()));
        assert_eq!(classify_ok(""), Instruction::Blank);
    }

    #[test]
    fn test_whitespace_only_lines_are_blank() {
        // Editors leave trailing spaces on "empty" lines; they are blanks,
        // not buffer expectations.
        assert_eq!(classify_ok("  "), Instruction::Blank);
        assert_eq!(classify_ok(" \t "), Instruction::Blank);
    }

    #[test]
    fn test_key_input_with_delay() {
        assert_eq!(
            classify_ok("  > iHello, world!<ESC> (2s)"),
            Instruction::KeyInput { text: "iHello, world!<ESC>".into(), delay: Some(2.0) }
        );
        assert_eq!(
            classify_ok("  > dd"),
            Instruction::KeyInput { text: "dd".into(), delay: None }
        );
    }

    #[test]
    fn test_ex_command() {
        assert_eq!(
            classify_ok("  :wqa"),
            Instruction::ExCommand { text: "wqa".into(), delay: None }
        );
        assert_eq!(
            classify_ok("  :sleep 1 (1.5s)"),
            Instruction::ExCommand { text: "sleep 1".into(), delay: Some(1.5) }
        );
    }

    #[test]
    fn test_buffer_text() {
        assert_eq!(
            classify_ok("  % Hello, world!"),
            Instruction::BufferText { text: "Hello, world!".into(), delay: None }
        );
    }

    #[test]
    fn test_message_expectation_mode() {
        assert_eq!(
            classify_ok("  ~ ERROR(*): (glob)"),
            Instruction::MessageExpectation { text: "ERROR(*):".into(), mode: Some(MatchMode::Glob) }
        );
        assert_eq!(
            classify_ok("  ~ plain message"),
            Instruction::MessageExpectation { text: "plain message".into(), mode: None }
        );
    }

    #[test]
    fn test_system_expectation() {
        assert_eq!(
            classify_ok("  ! echo From Vim"),
            Instruction::SystemExpectation { text: "echo From Vim".into(), mode: None }
        );
    }

    #[test]
    fn test_hijack_channels() {
        assert_eq!(
            classify_ok("  $ Nope, from the harness (stderr)"),
            Instruction::Hijack { response: "Nope, from the harness".into(), channel: Some(Channel::Stderr) }
        );
        assert_eq!(
            classify_ok("  $ I say..."),
            Instruction::Hijack { response: "I say...".into(), channel: None }
        );
    }

    #[test]
    fn test_buffer_expectation_controls() {
        assert_eq!(
            classify_ok("  Hello, world! (2 regex)"),
            Instruction::BufferExpectation {
                text: "Hello, world!".into(),
                buffer: Some(2),
                mode: Some(MatchMode::Regex),
                literal: false,
            }
        );
    }

    #[test]
    fn test_literal_expectation_skips_controls() {
        assert_eq!(
            classify_ok("  & > not a keystroke (2s)"),
            Instruction::BufferExpectation {
                text: "> not a keystroke (2s)".into(),
                buffer: None,
                mode: None,
                literal: true,
            }
        );
        // Bare `&` matches an empty buffer line
        assert_eq!(
            classify_ok("  &"),
            Instruction::BufferExpectation {
                text: String::new(),
                buffer: None,
                mode: None,
                literal: true,
            }
        );
    }

    #[test]
    fn test_escaped_control_block() {
        assert_eq!(
            classify_ok("  ends in parens (&see)"),
            Instruction::BufferExpectation {
                text: "ends in parens (see)".into(),
                buffer: None,
                mode: None,
                literal: false,
            }
        );
    }

    #[test]
    fn test_trailing_parens() {
        // A trailing block of plain words is taken for an annotation, so an
        // unknown word is an error; that is what the `(&…)` escape is for.
        assert!(classify("  ~ Press ENTER to continue (really)").is_err());
        // Punctuation inside the parens keeps the block as text.
        assert_eq!(
            classify_ok("  ~ Not an editor command: Nope (E492:)"),
            Instruction::MessageExpectation {
                text: "Not an editor command: Nope (E492:)".into(),
                mode: None,
            }
        );
    }

    #[test]
    fn test_directives() {
        assert_eq!(classify_ok("  @clear"), Instruction::Directive(Directive::Clear));
        assert_eq!(
            classify_ok("  @end (2)"),
            Instruction::Directive(Directive::End { buffer: Some(2) })
        );
        assert_eq!(
            classify_ok("  @messages (STRICT)"),
            Instruction::Directive(Directive::Messages(Some(Strictness::Strict)))
        );
        assert_eq!(
            classify_ok("  @system (RELAXED)"),
            Instruction::Directive(Directive::System(Some(Strictness::Relaxed)))
        );
        assert_eq!(
            classify_ok("  @system"),
            Instruction::Directive(Directive::System(None))
        );
    }

    #[test]
    fn test_unknown_directive_is_error() {
        assert!(classify("  @nope").is_err());
    }

    #[test]
    fn test_duplicate_control_is_error() {
        assert!(classify("  > x (2s 3s)").is_err());
        assert!(classify("  hello (2 3)").is_err());
    }

    #[test]
    fn test_parse_folds_continuations() {
        let file = parse("  :echomsg 'one'\n  |two\n", "t.vroom").unwrap();
        assert_eq!(file.instructions.len(), 1);
        assert_eq!(
            file.instructions[0].inst,
            Instruction::ExCommand { text: "echomsg 'one'\ntwo".into(), delay: None }
        );
        assert_eq!(file.instructions[0].lineno, 2);
    }

    #[test]
    fn test_continuation_without_instruction() {
        assert!(parse("  |orphan\n", "t.vroom").is_err());
    }

    #[test]
    fn test_three_blanks_become_clear() {
        let file = parse("  > x\n\n\n\n  > y\n", "t.vroom").unwrap();
        let kinds: Vec<&Instruction> = file.instructions.iter().map(|s| &s.inst).collect();
        assert!(matches!(kinds[0], Instruction::KeyInput { .. }));
        assert!(matches!(kinds[1], Instruction::Blank));
        assert!(matches!(kinds[2], Instruction::Blank));
        assert!(matches!(kinds[3], Instruction::Directive(Directive::Clear)));
        assert!(matches!(kinds[4], Instruction::KeyInput { .. }));
    }

    #[test]
    fn test_padded_blanks_count_toward_clear() {
        let file = parse("  > x\n  \n \n\t\n  > y\n", "t.vroom").unwrap();
        assert!(file
            .instructions
            .iter()
            .any(|s| matches!(s.inst, Instruction::Directive(Directive::Clear))));
    }

    #[test]
    fn test_comments_break_blank_combo() {
        let text = "  > x\n\n\ninterruption\n\n  > y\n";
        let file = parse(text, "t.vroom").unwrap();
        assert!(!file
            .instructions
            .iter()
            .any(|s| matches!(s.inst, Instruction::Directive(Directive::Clear))));
    }

    #[test]
    fn test_macro_definition_and_invocation() {
        let text = "  @macro greet who\n  > iHello, $who!<ESC>\n  Hello, $who!\n  @endmacro\n  @do greet World\n";
        let file = parse(text, "t.vroom").unwrap();
        let mac = &file.macros["greet"];
        assert_eq!(mac.params, vec!["who"]);
        assert_eq!(mac.body.len(), 2);
        assert_eq!(
            file.instructions,
            vec![Sourced {
                lineno: 5,
                inst: Instruction::MacroInvocation {
                    name: "greet".into(),
                    args: vec!["World".into()],
                },
            }]
        );
    }

    #[test]
    fn test_macro_arity_checked_at_parse_time() {
        let text = "  @macro m a b\n  > $a$b\n  @endmacro\n  @do m one\n";
        let err = parse(text, "t.vroom").unwrap_err();
        assert!(err.message.contains("takes 2 argument(s)"));
    }

    #[test]
    fn test_undefined_macro_is_parse_error() {
        assert!(parse("  @do ghost\n", "t.vroom").is_err());
    }

    #[test]
    fn test_macro_redefinition_is_error() {
        let text = "  @macro m\n  @endmacro\n  @macro m\n  @endmacro\n";
        assert!(parse(text, "t.vroom").is_err());
    }

    #[test]
    fn test_unterminated_macro_is_error() {
        assert!(parse("  @macro m\n  > x\n", "t.vroom").is_err());
    }

    #[test]
    fn test_endmacro_without_macro_is_error() {
        assert!(parse("  @endmacro\n", "t.vroom").is_err());
    }

    #[test]
    fn test_endmacro_with_trailing_whitespace() {
        let file = parse("  @macro m\n  > x\n  @endmacro \n  @do m\n", "t.vroom").unwrap();
        assert!(file.macros.contains_key("m"));
        assert_eq!(file.macros["m"].body.len(), 1);
    }

    #[test]
    fn test_substitute_positional() {
        let params = vec!["who".to_string(), "punct".to_string()];
        let args = vec!["World".to_string(), "!".to_string()];
        assert_eq!(
            substitute("Hello, $who${punct}", &params, &args),
            "Hello, World!"
        );
    }

    #[test]
    fn test_substitute_leaves_unknown_dollars() {
        let params = vec!["a".to_string()];
        let args = vec!["x".to_string()];
        assert_eq!(substitute("echo $HOME $a", &params, &args), "echo $HOME x");
        assert_eq!(substitute("cost: $5", &params, &args), "cost: $5");
    }
}
