//! Batch object protocol for objcache.
//!
//! The backing store answers one request line (`<40-hex-id>\n`) with either
//!
//! ```text
//! <40-hex-id> <type> <decimal-length>\n
//! <length bytes of payload>\n
//! ```
//!
//! or `<40-hex-id> missing\n`. [`BatchDecoder`] turns that byte stream into
//! [`DecodeEvent`]s incrementally: it can be fed any prefix of the stream and
//! reports how many bytes it consumed, leaving the caller to keep the
//! unconsumed tail and append the next read to it.

pub mod decoder;
pub mod declaration;
pub mod encode;
pub mod error;
pub mod state;
pub mod states;

pub use declaration::Declaration;
pub use decoder::{
    BatchDecoder, DecodeEvent, Decoded, Object, ParsedObject, DEFAULT_MAX_COMMIT_LINE_LEN,
    DEFAULT_MAX_HEADER_LEN,
};
pub use encode::{encode_missing, encode_request, encode_response, encode_tree};
pub use error::{ProtocolError, ProtocolResult};
pub use state::{ParseState, Step};
