#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Engine construction and host functions.
pub mod engine;
/// Persistent state across cells.
pub mod environment;
/// The grader type exposed to submissions.
pub mod notebook;
/// Per-submission shared state.
pub mod session;

pub use engine::create_engine;
pub use environment::{Definition, Environment, Prelude, ScriptContext, is_host_function};
pub use notebook::Notebook;
pub use session::{CancellationToken, HeadlessGuard, LogRecorder, Session};
