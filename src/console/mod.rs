//! Console layer: an interactive command line over an endpoint stream.
//!
//! The [`ConsoleWorker`] owns a thread running a [`ConsoleLoop`] bound
//! to one stream. Lines come from a [`LineEditor`] and are dispatched
//! through a [`CommandRegistry`].

pub mod commands;
pub mod io;
pub mod line_editor;
pub mod registry;
pub mod status;
pub mod worker;

pub use commands::{HelpCommand, StatusCommand, VersionCommand, register_builtins};
pub use io::ConsoleIo;
pub use line_editor::{CompletionFn, DumbLineEditor, LineEditor, LineRead};
pub use registry::{Command, CommandContext, CommandRegistry, split_args};
pub use worker::{ConsoleLoop, ConsoleState, ConsoleWorker, DispatchOutcome, Step};
