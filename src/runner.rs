//! Test discovery and per-file orchestration
//!
//! Finds `.vroom` files, spins up one editor server per file with a fresh
//! mailbox set, runs the file through the controller, and aggregates the
//! verdicts into a report the command line can render.

use std::path::{Path, PathBuf};

use crate::controller::{Controller, ControllerConfig, Verdict};
use crate::error::HarnessError;
use crate::mailbox::{MailboxSet, SHELL_VAR};
use crate::parser;
use crate::transport::{VimConfig, VimTransport};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Only run files whose name contains this substring
    pub filter: Option<String>,
    /// Leave the mailbox directory behind for postmortems
    pub keep_mailboxes: bool,
    pub vim_cmd: String,
    pub servername: String,
    pub vimrc: Option<PathBuf>,
    /// Seconds to allow the editor server to come up
    pub startup_time: f64,
    pub controller: ControllerConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            filter: None,
            keep_mailboxes: false,
            vim_cmd: "vim".to_string(),
            servername: "EDSPEC".to_string(),
            vimrc: None,
            startup_time: 0.5,
            controller: ControllerConfig::default(),
        }
    }
}

/// One test file's outcome.
pub struct FileResult {
    pub path: PathBuf,
    pub verdict: Verdict,
    /// Where the mailboxes were kept, when requested
    pub mailbox_dir: Option<PathBuf>,
}

/// The outcome of a whole invocation.
pub struct RunReport {
    pub results: Vec<FileResult>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.verdict.passed())
    }

    /// 0 when everything passed, 1 on assertion failures, 2 when any file
    /// hit a harness-level error.
    pub fn exit_code(&self) -> i32 {
        if self.results.iter().any(|r| r.verdict.error.is_some()) {
            2
        } else if self.passed() {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        let total = self.results.len();
        let passed = self.results.iter().filter(|r| r.verdict.passed()).count();
        let failures: usize = self.results.iter().map(|r| r.verdict.failures.len()).sum();
        format!(
            "{} file(s): {} passed, {} failed ({} assertion failure(s))",
            total,
            passed,
            total - passed,
            failures
        )
    }
}

/// Collect the test files named by `paths`: files are taken as given,
/// directories are searched recursively for `.vroom` files. The result is
/// sorted and filtered.
pub fn discover(paths: &[PathBuf], filter: Option<&str>) -> Result<Vec<PathBuf>, HarnessError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        if path.is_dir() {
            let pattern = path.join("**").join("*.vroom");
            let pattern = pattern.to_string_lossy().into_owned();
            let matches = glob::glob(&pattern).map_err(|e| {
                HarnessError::harness(format!("bad search pattern {}: {}", pattern, e))
            })?;
            for entry in matches {
                let entry = entry.map_err(|e| {
                    HarnessError::harness(format!("cannot search {}: {}", path.display(), e))
                })?;
                files.push(entry);
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            return Err(HarnessError::harness(format!(
                "no such test file or directory: {}",
                path.display()
            )));
        }
    }
    files.sort();
    files.dedup();
    if let Some(filter) = filter {
        files.retain(|f| {
            f.file_name()
                .map(|n| n.to_string_lossy().contains(filter))
                .unwrap_or(false)
        });
    }
    if files.is_empty() {
        return Err(HarnessError::harness("no test files found"));
    }
    Ok(files)
}

pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run every discovered file, one editor server at a time.
    pub fn run(&self, paths: &[PathBuf]) -> Result<RunReport, HarnessError> {
        let files = discover(paths, self.config.filter.as_deref())?;
        let mut results = Vec::with_capacity(files.len());
        for file in &files {
            results.push(self.run_file(file)?);
        }
        Ok(RunReport { results })
    }

    /// Spawn parameters for one editor server. Every file reuses the
    /// configured server name, since only one editor runs at a time; that
    /// keeps the name a `--murder` caller must target knowable.
    fn editor_config(&self, shell: PathBuf, env: Vec<(String, String)>) -> VimConfig {
        VimConfig {
            vim_cmd: self.config.vim_cmd.clone(),
            servername: self.config.servername.clone(),
            vimrc: self.config.vimrc.clone(),
            startup_time: self.config.startup_time,
            shell,
            env,
        }
    }

    fn run_file(&self, path: &Path) -> Result<FileResult, HarnessError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                return Ok(FileResult {
                    path: path.to_path_buf(),
                    verdict: aborted(HarnessError::harness(format!(
                        "cannot read {}: {}",
                        path.display(),
                        e
                    ))),
                    mailbox_dir: None,
                });
            }
        };
        let file = match parser::parse(&text, path) {
            Ok(file) => file,
            Err(e) => {
                let e = match e.file {
                    Some(_) => e,
                    None => {
                        let line = e.line.unwrap_or(0);
                        e.with_location(path.display().to_string(), line)
                    }
                };
                return Ok(FileResult {
                    path: path.to_path_buf(),
                    verdict: aborted(e),
                    mailbox_dir: None,
                });
            }
        };

        let dir = tempfile::Builder::new()
            .prefix("edspec")
            .tempdir()
            .map_err(|e| HarnessError::harness(format!("cannot create mailbox dir: {}", e)))?;
        let mailboxes = MailboxSet::create_in(dir.path())?;

        let mut env = mailboxes.env_vars();
        env.push((
            SHELL_VAR.to_string(),
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string()),
        ));
        let mut transport = VimTransport::new(self.editor_config(shell_substitute()?, env));
        let verdict = match transport.start() {
            Ok(()) => {
                let mut controller = Controller::new(self.config.controller.clone());
                controller.run(&file, &mut transport, &mailboxes)
            }
            Err(e) => aborted(e),
        };
        transport.shutdown();

        let mailbox_dir = if self.config.keep_mailboxes {
            Some(dir.into_path())
        } else {
            None
        };
        Ok(FileResult { path: path.to_path_buf(), verdict, mailbox_dir })
    }
}

/// The shell substitute binary ships next to the harness binary.
fn shell_substitute() -> Result<PathBuf, HarnessError> {
    let me = std::env::current_exe()
        .map_err(|e| HarnessError::harness(format!("cannot locate own binary: {}", e)))?;
    let substitute = me.with_file_name("edspec-shell");
    if !substitute.is_file() {
        return Err(HarnessError::harness(format!(
            "shell substitute not found at {}",
            substitute.display()
        )));
    }
    Ok(substitute)
}

fn aborted(e: HarnessError) -> Verdict {
    Verdict { failures: Vec::new(), error: Some(e), log: String::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, "  > x\n").unwrap();
    }

    #[test]
    fn test_discover_recurses_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("b.vroom"));
        touch(&dir.path().join("a.vroom"));
        touch(&dir.path().join("nested/c.vroom"));
        std::fs::write(dir.path().join("notes.txt"), "not a test").unwrap();

        let files = discover(&[dir.path().to_path_buf()], None).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.vroom", "b.vroom", "c.vroom"]);
    }

    #[test]
    fn test_discover_filter() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("basic.vroom"));
        touch(&dir.path().join("macros.vroom"));

        let files = discover(&[dir.path().to_path_buf()], Some("mac")).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("macros.vroom"));
    }

    #[test]
    fn test_discover_explicit_file_skips_extension_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spec.txt");
        touch(&path);
        let files = discover(&[path.clone()], None).unwrap();
        assert_eq!(files, vec![path]);
    }

    #[test]
    fn test_discover_missing_path_is_error() {
        let err = discover(&[PathBuf::from("/no/such/place")], None).unwrap_err();
        assert!(err.message.contains("no such test file"));
    }

    #[test]
    fn test_discover_empty_result_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover(&[dir.path().to_path_buf()], None).is_err());
    }

    #[test]
    fn test_editor_server_name_matches_murder_target() {
        let runner = Runner::new(RunnerConfig::default());
        let config = runner.editor_config(PathBuf::from("/bin/true"), Vec::new());
        // A wedged run is killed with --murder against the configured
        // server name, so the spawned editor must use exactly that name.
        assert_eq!(config.servername, RunnerConfig::default().servername);
    }

    #[test]
    fn test_exit_codes() {
        let pass = RunReport {
            results: vec![FileResult {
                path: "a.vroom".into(),
                verdict: Verdict { failures: vec![], error: None, log: String::new() },
                mailbox_dir: None,
            }],
        };
        assert_eq!(pass.exit_code(), 0);

        let fail = RunReport {
            results: vec![FileResult {
                path: "a.vroom".into(),
                verdict: Verdict {
                    failures: vec![HarnessError::assertion("mismatch")],
                    error: None,
                    log: String::new(),
                },
                mailbox_dir: None,
            }],
        };
        assert_eq!(fail.exit_code(), 1);

        let broken = RunReport {
            results: vec![FileResult {
                path: "a.vroom".into(),
                verdict: aborted(HarnessError::syntax("bad line")),
                mailbox_dir: None,
            }],
        };
        assert_eq!(broken.exit_code(), 2);
    }
}
