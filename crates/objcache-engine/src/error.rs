use std::io;

use objcache_protocol::ProtocolError;

/// Errors produced by the fetch engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The batch process could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Reading the batch process output failed.
    #[error("read from batch process failed: {0}")]
    Read(#[source] io::Error),

    /// The batch process closed its output; no more objects will arrive.
    #[error("batch stream closed")]
    StreamClosed,

    /// The output ended in the middle of a response.
    #[error("batch stream ended inside a response ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// The output did not match the batch grammar.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Writing requests to the batch process failed.
    #[error("write to batch process failed: {0}")]
    Write(#[source] io::Error),

    /// Killing the batch process failed.
    #[error("failed to terminate batch process: {0}")]
    Terminate(#[source] io::Error),

    /// The engine has been shut down and accepts no more tasks.
    #[error("engine stopped")]
    Stopped,

    /// A task was dropped before it finished.
    #[error("task aborted: {0}")]
    TaskAborted(String),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A reader or writer loop panicked.
    #[error("engine loop failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience alias used throughout the engine crate.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
