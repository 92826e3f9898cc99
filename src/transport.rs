//! Editor transport
//!
//! The harness drives the editor through a thin remote-command client and
//! reads state back through expression queries. The transport is
//! deliberately fire-and-forget: the editor gives no signal that a command
//! has finished, so callers pair every send with a bounded wait.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::error::HarnessError;

/// The operations the harness needs from a live editor.
pub trait EditorTransport {
    /// Send raw keystrokes.
    fn send_keys(&mut self, keys: &str) -> Result<(), HarnessError>;
    /// Send an ex-style command.
    fn send_ex_command(&mut self, cmd: &str) -> Result<(), HarnessError>;
    /// Read the lines of a buffer; `None` means the active buffer.
    fn buffer_lines(&mut self, buffer: Option<usize>) -> Result<Vec<String>, HarnessError>;
    /// Read the accumulated echoed messages, oldest first.
    fn messages(&mut self) -> Result<Vec<String>, HarnessError>;
    /// Whether the editor process is still running.
    fn is_alive(&mut self) -> bool;
    /// Wipe all buffers and leave insert mode — the `@clear` reset.
    fn clear(&mut self) -> Result<(), HarnessError>;
}

/// Helper functions sourced into vim at startup. Kept inline rather than
/// shipped as a .vim file so installation stays a single binary.
const HELPER_VIM: &str = r#"
" Prevents tests from leaving swap files around.
set noswapfile

" Execute a command and return its output. Useful for :messages.
function! EdspecExecute(command)
  redir => l:output
  silent! execute a:command
  redir END
  return l:output
endfunction

" Reset a test.
function! EdspecClear()
  stopinsert
  silent! bufdo! bdelete!
endfunction

" Kill vim, independent of insert mode.
function! EdspecEnd()
  qa!
endfunction
"#;

/// Configuration for a vim client/server transport.
pub struct VimConfig {
    /// The vim executable
    pub vim_cmd: String,
    /// `--servername` identity; also the murder key
    pub servername: String,
    /// User vimrc to load (`-u`), `NONE` semantics when absent
    pub vimrc: Option<PathBuf>,
    /// Seconds to wait after spawning before the server answers
    pub startup_time: f64,
    /// The shell substitute vim should use for system calls
    pub shell: PathBuf,
    /// Extra environment (the mailbox locations)
    pub env: Vec<(String, String)>,
}

/// Drives a real vim through `--remote-send` / `--remote-expr`.
pub struct VimTransport {
    config: VimConfig,
    process: Option<Child>,
    helper_file: Option<tempfile::NamedTempFile>,
}

impl VimTransport {
    pub fn new(config: VimConfig) -> Self {
        Self { config, process: None, helper_file: None }
    }

    /// Spawn the vim server and wait out its startup.
    pub fn start(&mut self) -> Result<(), HarnessError> {
        let mut helper = tempfile::NamedTempFile::new()
            .map_err(|e| HarnessError::harness(format!("cannot write vim helper: {}", e)))?;
        helper.write_all(HELPER_VIM.as_bytes())?;

        let vimrc = self
            .config
            .vimrc
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "NONE".to_string());

        let mut cmd = Command::new(&self.config.vim_cmd);
        // '--clean' keeps plugins out; '-u' after it overrides its DEFAULTS.
        cmd.arg("--clean")
            .arg("-u")
            .arg(&vimrc)
            .arg("--servername")
            .arg(&self.config.servername)
            .arg("-c")
            .arg(format!("set shell={}", self.config.shell.display()))
            .arg("-c")
            .arg(format!("source {}", helper.path().display()));
        for (k, v) in &self.config.env {
            cmd.env(k, v);
        }
        let child = cmd
            .spawn()
            .map_err(|e| HarnessError::harness(format!("cannot start {}: {}", self.config.vim_cmd, e)))?;
        self.process = Some(child);
        self.helper_file = Some(helper);
        std::thread::sleep(std::time::Duration::from_secs_f64(self.config.startup_time));
        Ok(())
    }

    /// Run a vim client process against the server and collect its stdout.
    fn say(&mut self, args: &[&str]) -> Result<String, HarnessError> {
        if !self.is_alive() {
            return Err(HarnessError::harness("editor server process quit unexpectedly"));
        }
        let output = Command::new(&self.config.vim_cmd)
            .arg("--servername")
            .arg(&self.config.servername)
            .args(args)
            // Keep client messages in English so errors stay recognizable.
            .env("LC_ALL", "en_US.UTF-8")
            .env("LANGUAGE", "en_US.UTF-8")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| HarnessError::harness(format!("cannot run vim client: {}", e)))?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim_end_matches('\n');
        if !stderr.is_empty() {
            return Err(HarnessError::harness(format!(
                "editor rejected {:?}: {}",
                args, stderr
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Evaluate an expression on the server; returns the raw textual value.
    fn ask(&mut self, expression: &str) -> Result<String, HarnessError> {
        let out = self.say(&["--remote-expr", expression])?;
        // The client appends a trailing newline when there isn't one.
        Ok(out.strip_suffix('\n').unwrap_or(&out).to_string())
    }

    /// Try to quit cleanly; kill on failure. Safe to call when not started.
    pub fn shutdown(&mut self) {
        if self.is_alive() {
            // Expression evaluation works even in insert mode.
            let _ = self.ask("EdspecEnd()");
        }
        if let Some(mut child) = self.process.take() {
            if child.try_wait().ok().flatten().is_none() {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl Drop for VimTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl EditorTransport for VimTransport {
    fn send_keys(&mut self, keys: &str) -> Result<(), HarnessError> {
        self.say(&["--remote-send", keys]).map(|_| ())
    }

    fn send_ex_command(&mut self, cmd: &str) -> Result<(), HarnessError> {
        self.send_keys(&format!(":{}<CR>", cmd))
    }

    fn buffer_lines(&mut self, buffer: Option<usize>) -> Result<Vec<String>, HarnessError> {
        let target = match buffer {
            Some(n) => n.to_string(),
            None => "'%'".to_string(),
        };
        let out = self.ask(&format!("join(getbufline({}, 1, '$'), \"\\n\")", target))?;
        Ok(out.split('\n').map(str::to_string).collect())
    }

    fn messages(&mut self) -> Result<Vec<String>, HarnessError> {
        let out = self.ask("EdspecExecute('silent! messages')")?;
        Ok(out.split('\n').map(str::to_string).collect())
    }

    fn is_alive(&mut self) -> bool {
        match self.process {
            Some(ref mut child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    fn clear(&mut self) -> Result<(), HarnessError> {
        self.ask("EdspecClear()").map(|_| ())
    }
}

/// Forcibly terminate a wedged editor server by name, without access to the
/// original process handle. The abort path for unresponsive runs.
pub fn murder(vim_cmd: &str, servername: &str) -> Result<(), HarnessError> {
    let status = Command::new(vim_cmd)
        .arg("--servername")
        .arg(servername)
        .arg("--remote-expr")
        .arg("EdspecEnd()")
        .status()
        .map_err(|e| HarnessError::harness(format!("cannot run vim client: {}", e)))?;
    if status.success() {
        Ok(())
    } else {
        Err(HarnessError::harness(format!(
            "could not terminate editor server \"{}\"",
            servername
        )))
    }
}
