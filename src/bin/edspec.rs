use std::path::PathBuf;

use clap::Parser;

use edspec::controller::ControllerConfig;
use edspec::runner::{Runner, RunnerConfig};

/// Drive a live vim through .vroom test scripts.
#[derive(Parser)]
#[command(name = "edspec", version)]
struct Args {
    /// Test files, or directories to search for .vroom files
    #[arg(required_unless_present = "murder")]
    paths: Vec<PathBuf>,

    /// Print the execution trace for every file
    #[arg(short, long)]
    verbose: bool,

    /// Seconds to wait after each command before verifying
    #[arg(short, long, default_value_t = 0.09)]
    delay: f64,

    /// Extra seconds to wait for commands that shell out
    #[arg(long, default_value_t = 0.25)]
    shell_delay: f64,

    /// Seconds to allow the editor server to start up
    #[arg(long, default_value_t = 0.5)]
    startuptime: f64,

    /// The editor executable to drive
    #[arg(long, default_value = "vim")]
    vim: String,

    /// Base --servername for spawned editors; also the murder target
    #[arg(long, default_value = "EDSPEC")]
    servername: String,

    /// A vimrc to load instead of starting clean
    #[arg(long)]
    vimrc: Option<PathBuf>,

    /// Only run files whose name contains this substring
    #[arg(short, long)]
    filter: Option<String>,

    /// Terminate a wedged editor server and exit
    #[arg(long)]
    murder: bool,

    /// Keep each file's mailbox directory around for postmortems
    #[arg(long)]
    keep_mailboxes: bool,
}

fn main() {
    let args = Args::parse();

    if args.murder {
        match edspec::transport::murder(&args.vim, &args.servername) {
            Ok(()) => return,
            Err(e) => {
                eprintln!("edspec: {}", e);
                std::process::exit(2);
            }
        }
    }

    let runner = Runner::new(RunnerConfig {
        filter: args.filter,
        keep_mailboxes: args.keep_mailboxes,
        vim_cmd: args.vim,
        servername: args.servername,
        vimrc: args.vimrc,
        startup_time: args.startuptime,
        controller: ControllerConfig {
            delay: args.delay,
            shell_delay: args.shell_delay,
        },
    });

    let report = match runner.run(&args.paths) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("edspec: {}", e);
            std::process::exit(2);
        }
    };

    for result in &report.results {
        let status = if result.verdict.passed() { "PASS" } else { "FAIL" };
        println!("{} {}", status, result.path.display());
        for failure in &result.verdict.failures {
            println!("  {}", failure);
        }
        if let Some(ref error) = result.verdict.error {
            println!("  aborted: {}", error);
        }
        if args.verbose && !result.verdict.log.is_empty() {
            println!("{}", result.verdict.log);
        }
        if let Some(ref dir) = result.mailbox_dir {
            println!("  mailboxes kept in {}", dir.display());
        }
    }
    println!("{}", report.summary());
    std::process::exit(report.exit_code());
}
