//! Fetch engine for objcache.
//!
//! The engine drives one long-running batch process (by default
//! `git cat-file --batch`). Two tokio tasks cooperate over it:
//!
//! - the **reader** feeds the process output through the batch decoder and
//!   stores every completed object in the shared [`ObjectCache`];
//! - the **writer** runs submitted [`Task`]s one at a time, writes the ids
//!   they request and routes completed objects to the active task.
//!
//! Callers either look objects up in the cache directly, submit their own
//! tasks, or use the async `lookup_*` helpers on [`Engine`], which wrap the
//! built-in [`Walk`] task.
//!
//! [`ObjectCache`]: objcache_store::ObjectCache

pub mod config;
pub mod engine;
pub mod error;
pub mod process;
mod reader;
pub mod task;
pub mod walk;
mod writer;

#[cfg(test)]
mod testing;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use process::ProcessHandle;
pub use task::{Task, TaskContext};
pub use walk::{Walk, WalkHandle, WalkReport};
