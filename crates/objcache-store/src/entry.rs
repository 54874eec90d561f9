use std::fmt;
use std::sync::{Arc, OnceLock};

use objcache_types::ObjectId;

/// Stable handle to a cache entry.
///
/// The [`ObjectCache`](crate::ObjectCache) keeps the canonical handle for each
/// id; every lookup of the same id returns a clone pointing at the same entry.
pub type EntryRef<T> = Arc<CacheEntry<T>>;

/// A cache slot for one object, possibly not yet populated.
///
/// A fresh entry is an invalid placeholder: the object is wanted but has not
/// been fetched. It becomes valid exactly once; later populations are
/// ignored, so readers holding a reference to the data never see it change.
pub struct CacheEntry<T> {
    id: ObjectId,
    data: OnceLock<T>,
}

impl<T> CacheEntry<T> {
    pub(crate) fn placeholder(id: ObjectId) -> Self {
        Self {
            id,
            data: OnceLock::new(),
        }
    }

    /// The object id this entry caches.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns `true` once the object has been fetched.
    pub fn is_valid(&self) -> bool {
        self.data.get().is_some()
    }

    /// The fetched object, or `None` for a placeholder.
    pub fn get(&self) -> Option<&T> {
        self.data.get()
    }

    /// Populate the entry. Returns `false` if it was already valid, in which
    /// case `data` is dropped.
    pub(crate) fn populate(&self, data: T) -> bool {
        self.data.set(data).is_ok()
    }
}

impl<T: fmt::Debug> fmt::Debug for CacheEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("valid", &self.is_valid())
            .field("data", &self.data.get())
            .finish()
    }
}
