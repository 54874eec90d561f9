//! Deduplicating object cache for objcache.
//!
//! The [`ObjectCache`] is the single owner of every cached object. Entries are
//! created as invalid placeholders the first time anyone asks for an id, and
//! become valid exactly once when the engine delivers the parsed object.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content
//! - [`Tree`] -- ordered directory entries referring to children by id
//! - [`Commit`] -- tree, parents, signatures and message
//!
//! # Design Rules
//!
//! 1. Lookups never block on the backing store; they find or insert.
//! 2. An entry handed out once stays the entry for that id until `clear()`.
//! 3. Validity is monotonic: the first population wins, later ones are dropped.
//! 4. Cross references between objects are ids, never owning pointers.
//! 5. The cache lock is held for the map operation only.

pub mod cache;
pub mod entry;
pub mod object;

pub use cache::{CacheStats, KindStats, ObjectCache};
pub use entry::{CacheEntry, EntryRef};
pub use object::{Blob, Commit, EntryKind, EntryMode, Signature, Tree, TreeEntry};
