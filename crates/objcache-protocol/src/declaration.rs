use std::fmt;

use objcache_types::{ObjectId, ObjectKind};

/// Parsed header announcing an object's id, type and exact payload length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub id: ObjectId,
    pub kind: ObjectKind,
    pub length: usize,
}

impl Declaration {
    pub fn new(id: ObjectId, kind: ObjectKind, length: usize) -> Self {
        Self { id, kind, length }
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.id, self.kind, self.length)
    }
}
