//! edspec drives a live vim through plain-text test scripts and verifies
//! what the editor did: buffer contents, echoed messages, and the system
//! calls it made, which can be intercepted and answered with fake output.
//!
//! A test file is prose with 2-space-indented action lines:
//!
//! ```text
//! This is a comment. Indented lines below act on the editor.
//!
//!   > iHello, world!<ESC>
//!   Hello, world!
//!   :echomsg 'done'
//!   ~ done
//!   :call system('make test')
//!   ! make test
//!   $ All 7 tests passed
//! ```
//!
//! Line leaders:
//!
//! | leader | meaning                                        |
//! |--------|------------------------------------------------|
//! | `> `   | send raw keystrokes                            |
//! | `:`    | send an ex-style command                       |
//! | `% `   | insert text (sugar for `i…<ESC>`)              |
//! | none   | expect this line in the buffer                 |
//! | `& `   | expect this line literally, no annotations     |
//! | `~ `   | expect this echoed message                     |
//! | `! `   | expect this system call (regex by default)     |
//! | `$ `   | answer the expected system call with this line |
//! | `|`    | continue the previous line                     |
//! | `@`    | directive: `@clear`, `@end`, `@messages`, `@system`, `@macro`/`@endmacro`, `@do` |
//!
//! A trailing ` (words)` block annotates a line with a delay (`2s`), a
//! buffer number, a match mode (`verbatim`, `glob`, `regex`), an output
//! channel (`stdout`, `stderr`, `status`, `command`), or a strictness
//! (`STRICT`, `RELAXED`), depending on the leader.
//!
//! System calls are intercepted by pointing vim's `shell` option at the
//! `edspec-shell` binary, which consults file mailboxes shared with the
//! harness to decide whether to fake the call's output or let it through.

pub mod buffer;
pub mod controller;
pub mod error;
pub mod intercept;
pub mod mailbox;
pub mod matcher;
pub mod messages;
pub mod model;
pub mod parser;
pub mod runner;
pub mod transport;

pub use controller::{Controller, ControllerConfig, Verdict};
pub use error::{ErrorKind, HarnessError};
pub use model::{Channel, Instruction, MatchMode, Strictness, TestFile};
pub use runner::{RunReport, Runner, RunnerConfig};
