use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use objcache_types::ObjectId;
use serde::Serialize;
use tracing::trace;

use crate::entry::{CacheEntry, EntryRef};
use crate::object::{Blob, Commit, Tree};

type EntryMap<T> = HashMap<ObjectId, EntryRef<T>>;

#[derive(Default)]
struct CacheMaps {
    blobs: EntryMap<Blob>,
    trees: EntryMap<Tree>,
    commits: EntryMap<Commit>,
}

fn find_or_insert<T>(map: &mut EntryMap<T>, id: ObjectId) -> EntryRef<T> {
    Arc::clone(
        map.entry(id)
            .or_insert_with(|| Arc::new(CacheEntry::placeholder(id))),
    )
}

fn count<T>(map: &EntryMap<T>) -> KindStats {
    KindStats {
        entries: map.len(),
        valid: map.values().filter(|e| e.is_valid()).count(),
    }
}

/// Entry counts for one object kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// All entries, placeholders included.
    pub entries: usize,
    /// Entries whose object has been fetched.
    pub valid: usize,
}

/// Snapshot of cache occupancy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub blobs: KindStats,
    pub trees: KindStats,
    pub commits: KindStats,
}

impl CacheStats {
    /// Total entries across all kinds.
    pub fn entries(&self) -> usize {
        self.blobs.entries + self.trees.entries + self.commits.entries
    }

    /// Total valid entries across all kinds.
    pub fn valid(&self) -> usize {
        self.blobs.valid + self.trees.valid + self.commits.valid
    }
}

/// Thread-safe, deduplicating map from object id to cache entry.
///
/// One mutex guards the blob, tree and commit maps. It is held only for the
/// find-or-insert itself; populating an entry happens after the lock is
/// released, and no caller code ever runs under it.
///
/// Each kind has its own map, so the same id looked up as a blob and as a
/// tree yields two distinct entries.
pub struct ObjectCache {
    maps: Mutex<CacheMaps>,
}

impl ObjectCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            maps: Mutex::new(CacheMaps::default()),
        }
    }

    // ---- Cache-only lookups (find or insert) ----

    /// Return the blob entry for `id`, inserting a placeholder if unseen.
    pub fn lookup_cache_blob(&self, id: ObjectId) -> EntryRef<Blob> {
        trace!(%id, "lookup cache blob");
        let mut maps = self.maps.lock().expect("cache lock poisoned");
        find_or_insert(&mut maps.blobs, id)
    }

    /// Return the tree entry for `id`, inserting a placeholder if unseen.
    pub fn lookup_cache_tree(&self, id: ObjectId) -> EntryRef<Tree> {
        trace!(%id, "lookup cache tree");
        let mut maps = self.maps.lock().expect("cache lock poisoned");
        find_or_insert(&mut maps.trees, id)
    }

    /// Return the commit entry for `id`, inserting a placeholder if unseen.
    pub fn lookup_cache_commit(&self, id: ObjectId) -> EntryRef<Commit> {
        trace!(%id, "lookup cache commit");
        let mut maps = self.maps.lock().expect("cache lock poisoned");
        find_or_insert(&mut maps.commits, id)
    }

    // ---- Population ----

    /// Populate the blob entry for `id`. A no-op if it is already valid.
    pub fn set_blob(&self, id: ObjectId, blob: Blob) -> EntryRef<Blob> {
        let entry = self.lookup_cache_blob(id);
        if !entry.populate(blob) {
            trace!(%id, "blob already valid, discarding duplicate");
        }
        entry
    }

    /// Populate the tree entry for `id`. A no-op if it is already valid.
    pub fn set_tree(&self, id: ObjectId, tree: Tree) -> EntryRef<Tree> {
        let entry = self.lookup_cache_tree(id);
        if !entry.populate(tree) {
            trace!(%id, "tree already valid, discarding duplicate");
        }
        entry
    }

    /// Populate the commit entry for `id`. A no-op if it is already valid.
    pub fn set_commit(&self, id: ObjectId, commit: Commit) -> EntryRef<Commit> {
        let entry = self.lookup_cache_commit(id);
        if !entry.populate(commit) {
            trace!(%id, "commit already valid, discarding duplicate");
        }
        entry
    }

    // ---- Inspection ----

    /// Existing blob entry for `id`, without inserting a placeholder.
    pub fn peek_blob(&self, id: &ObjectId) -> Option<EntryRef<Blob>> {
        let maps = self.maps.lock().expect("cache lock poisoned");
        maps.blobs.get(id).cloned()
    }

    /// Existing tree entry for `id`, without inserting a placeholder.
    pub fn peek_tree(&self, id: &ObjectId) -> Option<EntryRef<Tree>> {
        let maps = self.maps.lock().expect("cache lock poisoned");
        maps.trees.get(id).cloned()
    }

    /// Existing commit entry for `id`, without inserting a placeholder.
    pub fn peek_commit(&self, id: &ObjectId) -> Option<EntryRef<Commit>> {
        let maps = self.maps.lock().expect("cache lock poisoned");
        maps.commits.get(id).cloned()
    }

    /// Entry counts per kind.
    pub fn stats(&self) -> CacheStats {
        let maps = self.maps.lock().expect("cache lock poisoned");
        CacheStats {
            blobs: count(&maps.blobs),
            trees: count(&maps.trees),
            commits: count(&maps.commits),
        }
    }

    /// Number of entries across all kinds, placeholders included.
    pub fn len(&self) -> usize {
        let maps = self.maps.lock().expect("cache lock poisoned");
        maps.blobs.len() + maps.trees.len() + maps.commits.len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    ///
    /// Handles already given out stay usable but are no longer the canonical
    /// entry for their id; the next lookup creates a fresh placeholder.
    pub fn clear(&self) {
        let mut maps = self.maps.lock().expect("cache lock poisoned");
        *maps = CacheMaps::default();
    }
}

impl Default for ObjectCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ObjectCache")
            .field("entries", &stats.entries())
            .field("valid", &stats.valid())
            .finish()
    }
}
