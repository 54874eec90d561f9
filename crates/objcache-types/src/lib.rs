//! Foundation types for objcache.
//!
//! Every other objcache crate depends on `objcache-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- 20-byte content identity with a 40-character hex form
//! - [`ObjectKind`] -- the object type announced by a batch header

pub mod error;
pub mod kind;
pub mod object;

pub use error::TypeError;
pub use kind::ObjectKind;
pub use object::{ObjectId, OBJECT_ID_HEX_LEN, OBJECT_ID_LEN};
