//! Test execution
//!
//! Walks a parsed test file and drives the editor through the transport.
//! Input lines open a command block; message expectations and system-call
//! controls attach to the open block; the block is flushed (sent, waited
//! out, reconciled) when the next buffer check, directive, input line, or
//! end of file arrives. Assertion failures are collected and execution
//! continues; harness-level errors abort the rest of the file.

use std::time::Duration;

use crate::buffer::BufferTracker;
use crate::error::{ErrorKind, HarnessError};
use crate::mailbox::MailboxSet;
use crate::messages;
use crate::model::{
    Control, Directive, Instruction, LogEntry, MatchMode, Sourced, Strictness, TestFile,
};
use crate::parser;
use crate::transport::EditorTransport;

/// Macro invocations may nest this deep before the run is abandoned.
const MAX_MACRO_DEPTH: usize = 10;

/// Timing knobs for one run.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Seconds to wait after sending a command before verifying its effects
    pub delay: f64,
    /// Extra wait when the command has system-call controls queued, since a
    /// shell round trip is slower than a keystroke
    pub shell_delay: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { delay: 0.09, shell_delay: 0.25 }
    }
}

/// The outcome of running one test file.
#[derive(Debug)]
pub struct Verdict {
    /// Collected assertion failures, in encounter order
    pub failures: Vec<HarnessError>,
    /// The fatal error that aborted the run, if one did
    pub error: Option<HarnessError>,
    /// Human-readable execution trace
    pub log: String,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.error.is_none()
    }
}

/// One command and the expectations attached to it, waiting to be flushed.
struct CommandBlock {
    /// Rendered keystrokes; `None` for a block opened by a bare expectation
    keys: Option<String>,
    delay: Option<f64>,
    lineno: usize,
    messages: Vec<(String, Option<MatchMode>)>,
    controls: Vec<Control>,
}

impl CommandBlock {
    fn bare(lineno: usize) -> Self {
        Self { keys: None, delay: None, lineno, messages: Vec::new(), controls: Vec::new() }
    }

    fn is_empty(&self) -> bool {
        self.keys.is_none() && self.messages.is_empty() && self.controls.is_empty()
    }
}

pub struct Controller {
    config: ControllerConfig,
    strict_messages: Strictness,
    strict_system: Strictness,
    tracker: BufferTracker,
    pending: Option<CommandBlock>,
    /// Log mailbox entries reconciled so far
    log_checkpoint: usize,
    file: String,
    log: String,
    failures: Vec<HarnessError>,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            // Editors echo and shell out liberally, so stray observations
            // are tolerated until a test opts in with @messages/@system.
            strict_messages: Strictness::Relaxed,
            strict_system: Strictness::Relaxed,
            tracker: BufferTracker::new(),
            pending: None,
            log_checkpoint: 0,
            file: String::new(),
            log: String::new(),
            failures: Vec::new(),
        }
    }

    /// Run a whole test file against a live transport.
    pub fn run(
        &mut self,
        file: &TestFile,
        transport: &mut dyn EditorTransport,
        mailboxes: &MailboxSet,
    ) -> Verdict {
        self.file = file.path.display().to_string();
        let error = self
            .exec(&file.instructions, file, transport, mailboxes, 0)
            .and_then(|_| self.flush(transport, mailboxes))
            .err();
        Verdict {
            failures: std::mem::take(&mut self.failures),
            error,
            log: std::mem::take(&mut self.log),
        }
    }

    fn exec(
        &mut self,
        instructions: &[Sourced],
        file: &TestFile,
        transport: &mut dyn EditorTransport,
        mailboxes: &MailboxSet,
        depth: usize,
    ) -> Result<(), HarnessError> {
        for sourced in instructions {
            let lineno = sourced.lineno;
            let result = self.step(sourced, file, transport, mailboxes, depth);
            if let Err(e) = result {
                let e = self.located(e, lineno);
                if e.is_fatal() {
                    return Err(e);
                }
                self.failures.push(e);
            }
        }
        Ok(())
    }

    fn step(
        &mut self,
        sourced: &Sourced,
        file: &TestFile,
        transport: &mut dyn EditorTransport,
        mailboxes: &MailboxSet,
        depth: usize,
    ) -> Result<(), HarnessError> {
        let lineno = sourced.lineno;
        match &sourced.inst {
            Instruction::Blank => {
                // A blank line resets the buffer walk and seals the open
                // hijack, but the block stays open for more expectations.
                if let Some(ref mut block) = self.pending {
                    if let Some(last) = block.controls.last_mut() {
                        last.closed = true;
                    }
                }
                self.tracker.unload();
                Ok(())
            }
            Instruction::Comment(_) | Instruction::Continuation(_) => Ok(()),
            Instruction::KeyInput { text, delay } => {
                self.open_block(text.clone(), *delay, lineno, transport, mailboxes)
            }
            Instruction::ExCommand { text, delay } => self.open_block(
                format!(":{}<CR>", text),
                *delay,
                lineno,
                transport,
                mailboxes,
            ),
            Instruction::BufferText { text, delay } => self.open_block(
                format!("i{}<ESC>", text),
                *delay,
                lineno,
                transport,
                mailboxes,
            ),
            Instruction::MessageExpectation { text, mode } => {
                self.block(lineno).messages.push((text.clone(), *mode));
                Ok(())
            }
            Instruction::SystemExpectation { text, mode } => {
                let mode = mode.unwrap_or(MatchMode::Regex);
                self.block(lineno)
                    .controls
                    .push(Control::expecting(text.clone(), mode));
                Ok(())
            }
            Instruction::Hijack { response, channel } => {
                let controls = &mut self.block(lineno).controls;
                let open = matches!(controls.last(), Some(last) if !last.closed);
                if !open {
                    controls.push(Control::accept_any());
                }
                if let Some(last) = controls.last_mut() {
                    last.respond(response, *channel)?;
                }
                Ok(())
            }
            Instruction::BufferExpectation { text, buffer, mode, .. } => {
                self.flush(transport, mailboxes)?;
                self.tracker.verify_line(transport, text, *buffer, *mode)
            }
            Instruction::Directive(directive) => {
                self.flush(transport, mailboxes)?;
                match directive {
                    Directive::Clear => {
                        self.logln(lineno, "@clear");
                        transport.clear()?;
                        self.tracker.unload();
                        Ok(())
                    }
                    Directive::End { buffer } => {
                        self.tracker.ensure_at_end(transport, *buffer)
                    }
                    Directive::Messages(strictness) => {
                        self.strict_messages = strictness.unwrap_or(Strictness::Strict);
                        Ok(())
                    }
                    Directive::System(strictness) => {
                        self.strict_system = strictness.unwrap_or(Strictness::Strict);
                        Ok(())
                    }
                }
            }
            Instruction::MacroInvocation { name, args } => {
                if depth >= MAX_MACRO_DEPTH {
                    return Err(HarnessError::new(
                        ErrorKind::Recursion,
                        format!(
                            "macro \"{}\" nested deeper than {} invocations",
                            name, MAX_MACRO_DEPTH
                        ),
                    ));
                }
                parser::check_invocation(&file.macros, name, args, lineno)?;
                let mac = &file.macros[name];
                let body: Vec<(usize, String)> = mac
                    .body
                    .iter()
                    .map(|(n, line)| (*n, parser::substitute(line, &mac.params, args)))
                    .collect();
                let expanded = parser::parse_fragment(&body)?;
                self.logln(lineno, &format!("@do {} {}", name, args.join(" ")));
                self.exec(&expanded, file, transport, mailboxes, depth + 1)
            }
        }
    }

    /// Flush the open block, then start a fresh one holding `keys`.
    fn open_block(
        &mut self,
        keys: String,
        delay: Option<f64>,
        lineno: usize,
        transport: &mut dyn EditorTransport,
        mailboxes: &MailboxSet,
    ) -> Result<(), HarnessError> {
        self.flush(transport, mailboxes)?;
        self.pending = Some(CommandBlock {
            keys: Some(keys),
            delay,
            lineno,
            messages: Vec::new(),
            controls: Vec::new(),
        });
        Ok(())
    }

    /// The open block, opening a keyless one when an expectation arrives
    /// with no command before it.
    fn block(&mut self, lineno: usize) -> &mut CommandBlock {
        self.pending.get_or_insert_with(|| CommandBlock::bare(lineno))
    }

    /// Send the open block's command and reconcile everything it promised:
    /// queue controls, send, wait, then check messages, the system-call
    /// log, leftover controls, and substitute errors.
    fn flush(
        &mut self,
        transport: &mut dyn EditorTransport,
        mailboxes: &MailboxSet,
    ) -> Result<(), HarnessError> {
        let Some(block) = self.pending.take() else {
            return Ok(());
        };
        if block.is_empty() {
            return Ok(());
        }

        let old_messages = transport.messages()?;
        let has_controls = !block.controls.is_empty();
        if has_controls {
            mailboxes.control.store(&block.controls)?;
        }
        if let Some(ref keys) = block.keys {
            self.logln(block.lineno, &format!("send {}", keys));
            transport.send_keys(keys)?;
            let mut wait = block.delay.unwrap_or(self.config.delay);
            if has_controls {
                wait += self.config.shell_delay;
            }
            if wait > 0.0 {
                std::thread::sleep(Duration::from_secs_f64(wait));
            }
        }

        let new_messages = transport.messages()?;
        let (message_log, message_failures) = messages::verify(
            &old_messages,
            &new_messages,
            &block.messages,
            self.strict_messages,
        );
        for line in message_log {
            self.logln(block.lineno, &line);
        }
        for failure in message_failures {
            let failure = self.located(failure, block.lineno);
            self.failures.push(failure);
        }

        self.reconcile_system(&block, mailboxes)
    }

    fn reconcile_system(
        &mut self,
        block: &CommandBlock,
        mailboxes: &MailboxSet,
    ) -> Result<(), HarnessError> {
        let entries = mailboxes.log.load()?;
        for entry in &entries[self.log_checkpoint..] {
            self.logln(block.lineno, &entry.to_string());
            if self.strict_system == Strictness::Strict {
                if matches!(entry, LogEntry::Unexpected) {
                    let failure = self.located(
                        HarnessError::new(
                            ErrorKind::UnexpectedCall,
                            "unexpected system call, no hijack was queued for it",
                        ),
                        block.lineno,
                    );
                    self.failures.push(failure);
                }
            }
        }
        self.log_checkpoint = entries.len();

        if !block.controls.is_empty() {
            let leftover = mailboxes.control.load()?;
            for control in &leftover {
                let failure = match control.expectation {
                    Some(ref expectation) => HarnessError::assertion(format!(
                        "expected system call not received: \"{}\" ({} mode)",
                        expectation, control.mode
                    )),
                    None => HarnessError::assertion(
                        "hijacked response was never requested by the editor",
                    ),
                };
                let failure = self.located(failure, block.lineno);
                self.failures.push(failure);
            }
            if !leftover.is_empty() {
                mailboxes.control.store(&[])?;
            }
        }

        let substitute_errors = mailboxes.error.load()?;
        if let Some(first) = substitute_errors.first() {
            return Err(HarnessError::new(
                ErrorKind::Interception,
                format!(
                    "shell substitute failed while handling \"{}\": {}",
                    first.context, first.message
                ),
            ));
        }
        Ok(())
    }

    fn located(&self, e: HarnessError, lineno: usize) -> HarnessError {
        if e.file.is_some() {
            return e;
        }
        let lineno = e.line.unwrap_or(lineno);
        e.with_location(self.file.clone(), lineno)
    }

    fn logln(&mut self, lineno: usize, text: &str) {
        self.log.push_str(&format!("{:>4}  {}\n", lineno, text));
    }
}

/// Test doubles for the transport seam.
pub mod testing {
    use std::collections::{HashMap, VecDeque};

    use crate::error::HarnessError;
    use crate::transport::EditorTransport;

    /// An in-process editor stand-in. Buffers and message batches are
    /// scripted up front; keystrokes are recorded for assertions.
    #[derive(Default)]
    pub struct FakeTransport {
        /// The active buffer
        pub buffer: Vec<String>,
        /// Numbered buffers, for `(N)` annotations
        pub numbered: HashMap<usize, Vec<String>>,
        /// The accumulated message list
        pub messages: Vec<String>,
        /// Every keystroke string sent, in order
        pub sent: Vec<String>,
        /// Message batches appended one per send, simulating echo output
        pub replies: VecDeque<Vec<String>>,
        /// Invoked on every send, simulating editor side effects
        pub on_send: Option<Box<dyn FnMut(&str)>>,
        /// Times `clear` was requested
        pub cleared: usize,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_buffer(lines: Vec<&str>) -> Self {
            Self {
                buffer: lines.into_iter().map(str::to_string).collect(),
                ..Self::default()
            }
        }

        /// Queue a message batch for the next send.
        pub fn reply_with(mut self, batch: Vec<&str>) -> Self {
            self.replies
                .push_back(batch.into_iter().map(str::to_string).collect());
            self
        }
    }

    impl EditorTransport for FakeTransport {
        fn send_keys(&mut self, keys: &str) -> Result<(), HarnessError> {
            self.sent.push(keys.to_string());
            if let Some(batch) = self.replies.pop_front() {
                self.messages.extend(batch);
            }
            if let Some(ref mut hook) = self.on_send {
                hook(keys);
            }
            Ok(())
        }

        fn send_ex_command(&mut self, cmd: &str) -> Result<(), HarnessError> {
            self.send_keys(&format!(":{}<CR>", cmd))
        }

        fn buffer_lines(&mut self, buffer: Option<usize>) -> Result<Vec<String>, HarnessError> {
            match buffer {
                Some(n) => Ok(self.numbered.get(&n).cloned().unwrap_or_default()),
                None => Ok(self.buffer.clone()),
            }
        }

        fn messages(&mut self) -> Result<Vec<String>, HarnessError> {
            Ok(self.messages.clone())
        }

        fn is_alive(&mut self) -> bool {
            true
        }

        fn clear(&mut self) -> Result<(), HarnessError> {
            self.buffer = vec![String::new()];
            self.cleared += 1;
            Ok(())
        }
    }
}
