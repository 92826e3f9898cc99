//! The disposable shell substitute the editor is pointed at. Everything
//! interesting happens in `edspec::intercept`; this stays a thin shim so
//! the behavior is testable in-process.

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    std::process::exit(edspec::intercept::run(&args));
}
