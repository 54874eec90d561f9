use objcache_store::{Blob, Commit, EntryRef, ObjectCache, Tree};
use objcache_types::ObjectId;
use tracing::debug;

use crate::error::EngineError;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work executed by the writer loop.
///
/// Tasks run one at a time in submission order. The writer calls
/// [`start`](Task::start) once when the task becomes active, then one
/// `on_*` callback per object the reader completes, until the task calls
/// [`TaskContext::finish`]. Responses may arrive in any order; a task is
/// responsible for counting the replies it is still waiting for.
///
/// Callbacks run on the writer loop and must not block.
pub trait Task: Send + 'static {
    /// Name used in log events.
    fn name(&self) -> &str {
        "task"
    }

    /// The task became active. Issue requests, or finish immediately.
    fn start(&mut self, cx: &mut TaskContext<'_>);

    /// A commit was fetched and is now valid in the cache.
    fn on_commit(&mut self, _entry: &EntryRef<Commit>, _cx: &mut TaskContext<'_>) {}

    /// A tree was fetched and is now valid in the cache.
    fn on_tree(&mut self, _entry: &EntryRef<Tree>, _cx: &mut TaskContext<'_>) {}

    /// A blob was fetched and is now valid in the cache.
    fn on_blob(&mut self, _entry: &EntryRef<Blob>, _cx: &mut TaskContext<'_>) {}

    /// The store has no object with this id.
    fn on_missing(&mut self, _id: ObjectId, _cx: &mut TaskContext<'_>) {}

    /// The engine stopped before the task finished. The task is dropped
    /// right after this call.
    fn on_abort(&mut self, _reason: &EngineError) {}
}

// ---------------------------------------------------------------------------
// TaskContext
// ---------------------------------------------------------------------------

/// Handle passed to task callbacks.
///
/// Requests are buffered and written to the batch process after the
/// callback returns.
#[derive(Debug)]
pub struct TaskContext<'a> {
    cache: &'a ObjectCache,
    requests: Vec<ObjectId>,
    finished: bool,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(cache: &'a ObjectCache) -> Self {
        Self {
            cache,
            requests: Vec::new(),
            finished: false,
        }
    }

    /// Ask the batch process for `id`. Exactly one `on_*` callback follows.
    pub fn request(&mut self, id: ObjectId) {
        self.requests.push(id);
    }

    /// Mark the task complete. Later calls are ignored.
    pub fn finish(&mut self) {
        if self.finished {
            debug!("task finished twice");
        }
        self.finished = true;
    }

    /// `true` once [`finish`](Self::finish) was called in this callback.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The cache shared with the engine.
    pub fn cache(&self) -> &'a ObjectCache {
        self.cache
    }

    /// Requests issued so far in this callback.
    pub fn pending_requests(&self) -> &[ObjectId] {
        &self.requests
    }

    pub(crate) fn into_parts(self) -> (Vec<ObjectId>, bool) {
        (self.requests, self.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_collects_requests_and_finish() {
        let cache = ObjectCache::new();
        let mut cx = TaskContext::new(&cache);
        let a = ObjectId::from_raw([1; 20]);
        let b = ObjectId::from_raw([2; 20]);
        cx.request(a);
        cx.request(b);
        assert_eq!(cx.pending_requests(), [a, b]);
        assert!(!cx.is_finished());

        cx.finish();
        cx.finish();
        assert!(cx.is_finished());
        assert_eq!(cx.into_parts(), (vec![a, b], true));
    }

    #[test]
    fn context_exposes_cache() {
        let cache = ObjectCache::new();
        let cx = TaskContext::new(&cache);
        let id = ObjectId::from_raw([3; 20]);
        cx.cache().lookup_cache_blob(id);
        assert!(cache.peek_blob(&id).is_some());
    }
}
