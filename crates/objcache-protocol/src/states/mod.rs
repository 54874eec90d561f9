//! Parser states of the batch decoder.
//!
//! Exactly one state is active at a time. The header state is active
//! between objects; a declaration hands control to the payload state for
//! the declared type, which returns control to the header state once the
//! declared number of bytes has been consumed.

pub mod blob;
pub mod commit;
pub mod header;
pub mod tree;

pub use blob::BlobState;
pub use commit::CommitState;
pub use header::{HeaderLine, HeaderState};
pub use tree::TreeState;
