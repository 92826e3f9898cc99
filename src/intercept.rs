//! The shell substitute
//!
//! The harness points the editor's `shell` option at the `edspec-shell`
//! binary, so every system call the editor makes runs this code in a fresh
//! process: read the mailboxes, decide whether a queued hijack claims the
//! call, write the mailboxes back, then delegate the (possibly substituted)
//! command to the real shell so the editor observes ordinary process
//! semantics.
//!
//! The editor wraps the user's command in redirection boilerplate, e.g.
//! `(user command) < /tmp/in > /tmp/out`. The wrapper is stripped before
//! matching and reassembled around the final command before execution, so
//! injected output flows through the same redirections.

use std::process::Command;

use crate::error::HarnessError;
use crate::mailbox::{MailboxSet, SHELL_VAR};
use crate::matcher;
use crate::model::{Control, InterceptError, LogEntry, MatchMode};

/// The user command extracted from a shell invocation, plus the boilerplate
/// needed to rebuild the full command line around a replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitInvocation {
    pub command: String,
    prefix: String,
    suffix: String,
}

impl SplitInvocation {
    pub fn rebuild(&self, command: &str) -> String {
        format!("{}{}{}", self.prefix, command, self.suffix)
    }
}

/// Parse the user-intended command out of the editor's shell boilerplate.
///
/// Grabs the first parenthesized block, skipping nested parens, escaped
/// characters, and parens inside quoted strings. Invocations that don't
/// start with `(` are taken whole.
pub fn split_invocation(raw: &str) -> SplitInvocation {
    if raw.starts_with('(') {
        let mut stack: Vec<char> = Vec::new();
        for (i, ch) in raw.char_indices() {
            match stack.last() {
                Some('\\') => {
                    stack.pop();
                    continue;
                }
                Some('"') if ch == '"' => {
                    stack.pop();
                }
                Some('\'') if ch == '\'' => {
                    stack.pop();
                }
                Some('(') if ch == ')' => {
                    stack.pop();
                }
                _ if ch == '\\' || ch == '\'' || ch == '"' || ch == '(' => {
                    stack.push(ch);
                }
                _ => {}
            }
            if stack.is_empty() {
                return SplitInvocation {
                    command: raw[1..i].to_string(),
                    prefix: "(".to_string(),
                    suffix: raw[i..].to_string(),
                };
            }
        }
    }
    SplitInvocation {
        command: raw.to_string(),
        prefix: String::new(),
        suffix: String::new(),
    }
}

/// Quote a string for the POSIX shell.
fn sh_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build the command that produces a control's responses. Stdout and stderr
/// lines become `printf` calls, a status becomes a trailing `exit`, and
/// command-channel lines run as-is in place of the original.
pub fn synthesize_response(control: &Control) -> String {
    let mut parts: Vec<String> = Vec::new();
    for line in &control.command {
        parts.push(line.clone());
    }
    for line in &control.stdout {
        parts.push(format!("printf '%s\\n' {}", sh_quote(line)));
    }
    for line in &control.stderr {
        parts.push(format!("printf '%s\\n' {} >&2", sh_quote(line)));
    }
    if let Some(status) = control.status {
        parts.push(format!("exit {}", status));
    }
    parts.join("; ")
}

/// Bind regex capture groups from the matched command into the control's
/// response lines, so `! echo (.*)` can be answered with `$ you said \1`.
/// Only regex-mode expectations have groups; other modes pass through.
fn expand_control(control: &mut Control, command: &str) -> Result<(), HarnessError> {
    if control.mode != MatchMode::Regex {
        return Ok(());
    }
    let Some(ref expectation) = control.expectation else {
        return Ok(());
    };
    let Some(caps) = matcher::compile_anchored(expectation)?.captures(command) else {
        return Ok(());
    };
    for line in control
        .command
        .iter_mut()
        .chain(control.stdout.iter_mut())
        .chain(control.stderr.iter_mut())
    {
        *line = expand_captures(line, &caps)?;
    }
    Ok(())
}

/// Replace `\N` references in a response template with the Nth capture
/// group; `\\` is a literal backslash. A reference to a group the
/// expectation never captured is an error.
fn expand_captures(template: &str, caps: &regex::Captures) -> Result<String, HarnessError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let index: usize = digits.parse().map_err(|_| {
                    HarnessError::interception(format!(
                        "bad group reference \\{} in response \"{}\"",
                        digits, template
                    ))
                })?;
                match caps.get(index) {
                    Some(group) => out.push_str(group.as_str()),
                    None => {
                        return Err(HarnessError::interception(format!(
                            "invalid group reference \\{} in response \"{}\"",
                            index, template
                        )));
                    }
                }
            }
            _ => out.push('\\'),
        }
    }
    Ok(out)
}

/// What the log should say the substitute responded with.
fn response_summary(control: &Control) -> String {
    let mut lines: Vec<&str> = Vec::new();
    lines.extend(control.command.iter().map(String::as_str));
    lines.extend(control.stdout.iter().map(String::as_str));
    lines.extend(control.stderr.iter().map(String::as_str));
    let mut summary = lines.join("\n");
    if let Some(status) = control.status {
        if !summary.is_empty() {
            summary.push('\n');
        }
        summary.push_str(&format!("exit {}", status));
    }
    summary
}

/// Resolve one system call against the mailboxes.
///
/// Appends the log entries describing how the call was handled, dequeues a
/// consumed control, and returns the full command line to hand to the real
/// shell. This is steps 1–6 of the protocol; execution is [`run`]'s job.
pub fn handle(mailboxes: &MailboxSet, raw_invocation: &str) -> Result<String, HarnessError> {
    let split = split_invocation(raw_invocation);
    let mut log = vec![LogEntry::Received { command: split.command.clone() }];

    let mut controls = mailboxes.control.load()?;
    let mut replacement: Option<String> = None;

    let consumed = match controls.first() {
        Some(head) => matcher::matches_opt(&split.command, head.expectation.as_deref(), head.mode)?,
        None => false,
    };
    if consumed {
        let mut head = controls.remove(0);
        if let Some(ref expectation) = head.expectation {
            log.push(LogEntry::Matched {
                expectation: expectation.clone(),
                mode: head.mode,
            });
        }
        expand_control(&mut head, &split.command)?;
        if head.has_response() {
            log.push(LogEntry::Responded { response: response_summary(&head) });
            replacement = Some(synthesize_response(&head));
        }
        mailboxes.control.store(&controls)?;
    } else {
        log.push(LogEntry::Unexpected);
    }
    mailboxes.log.extend(log)?;

    let final_command = match replacement {
        Some(ref cmd) => split.rebuild(cmd),
        None => raw_invocation.to_string(),
    };
    Ok(final_command)
}

/// Entry point for the `edspec-shell` binary: resolve the call, execute the
/// result through the real shell, and exit with its status. Any internal
/// failure lands in the error mailbox and yields a nonzero status instead
/// of propagating the command.
pub fn run(args: &[String]) -> i32 {
    let invocation = match parse_args(args) {
        Ok(cmd) => cmd,
        Err(e) => return record_error(&e, args),
    };
    let mailboxes = match MailboxSet::from_env() {
        Ok(m) => m,
        Err(e) => return record_error(&e, args),
    };
    let final_command = match handle(&mailboxes, &invocation) {
        Ok(cmd) => cmd,
        Err(e) => {
            let _ = mailboxes.error.extend(vec![InterceptError {
                message: e.to_string(),
                context: invocation.clone(),
            }]);
            return 1;
        }
    };

    let shell = std::env::var(SHELL_VAR).unwrap_or_else(|_| "/bin/sh".to_string());
    match Command::new(&shell).arg("-c").arg(&final_command).status() {
        Ok(status) => status.code().unwrap_or(1),
        Err(e) => {
            let _ = mailboxes.error.extend(vec![InterceptError {
                message: format!("cannot run {}: {}", shell, e),
                context: final_command,
            }]);
            1
        }
    }
}

/// The editor invokes its shell as `<shell> -c '<command>'`.
fn parse_args(args: &[String]) -> Result<String, HarnessError> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "-c" {
            return iter
                .next()
                .cloned()
                .ok_or_else(|| HarnessError::interception("-c with no command"));
        }
    }
    Err(HarnessError::interception(format!(
        "unexpected shell invocation: {:?}",
        args
    )))
}

fn record_error(e: &HarnessError, args: &[String]) -> i32 {
    if let Ok(mailboxes) = MailboxSet::from_env() {
        let _ = mailboxes.error.extend(vec![InterceptError {
            message: e.to_string(),
            context: format!("{:?}", args),
        }]);
    } else {
        eprintln!("edspec-shell: {}", e);
    }
    1
}
