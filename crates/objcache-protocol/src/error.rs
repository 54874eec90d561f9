use objcache_types::TypeError;
use thiserror::Error;

/// Input that cannot be interpreted in the decoder's current state.
///
/// Running out of bytes is not an error: states report it by consuming
/// nothing. These variants mean the stream is broken and more data will
/// not help.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed {state} data: {reason}")]
    Malformed { state: &'static str, reason: String },

    #[error("{state} line exceeds {max} bytes (have {len})")]
    HeaderTooLong {
        state: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid object id in {state}: {source}")]
    InvalidId {
        state: &'static str,
        source: TypeError,
    },

    #[error("invalid payload length: {0:?}")]
    InvalidLength(String),

    #[error("invalid tree entry mode: {0:?}")]
    InvalidMode(String),

    #[error("tree record needs {needed} bytes but only {remaining} remain in the payload")]
    RecordOverrun { needed: usize, remaining: usize },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
