use std::collections::hash_map::Entry;
use std::collections::HashMap;

use objcache_store::{Blob, Commit, EntryKind, EntryMode, EntryRef, Tree};
use objcache_types::{ObjectId, ObjectKind};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{EngineError, EngineResult};
use crate::task::{Task, TaskContext};

/// Outcome of a finished [`Walk`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    /// Objects fetched from the batch process.
    pub fetched: usize,
    /// Objects that were already valid in the cache.
    pub cached: usize,
    /// Requested ids the store does not have.
    pub missing: Vec<ObjectId>,
    /// Requested ids the store returned as a different kind, such as a
    /// commit id given to a tree walk.
    pub mismatched: Vec<ObjectId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Objects,
    Tree { blobs: bool },
    Commits,
}

/// How an id was reached relative to earlier visits in the same walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Visit {
    First,
    Shallower,
    Again,
}

/// How a reply relates to what the walk asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Arrival {
    Unrequested,
    Mismatched,
    Expected(usize),
}

/// The built-in fetch task.
///
/// A walk starts from one or more roots and requests every reachable
/// object that is not yet valid in the cache, counting outstanding replies
/// so it finishes exactly once. Objects already valid are traversed in
/// place without a request. A child shared by several parents is requested
/// and counted once.
///
/// Depth is measured from the root (depth 0); with `max_depth(n)` objects
/// up to depth `n` are loaded. A shared object is expanded according to the
/// shallowest path that reaches it, whatever order it is reached in.
#[derive(Debug)]
pub struct Walk {
    mode: Mode,
    roots: Vec<ObjectId>,
    max_depth: Option<usize>,
    depths: HashMap<ObjectId, usize>,
    pending: HashMap<ObjectId, Option<ObjectKind>>,
    report: WalkReport,
    notify: Option<oneshot::Sender<EngineResult<WalkReport>>>,
}

impl Walk {
    fn new(mode: Mode, roots: Vec<ObjectId>) -> Self {
        Self {
            mode,
            roots,
            max_depth: None,
            depths: HashMap::new(),
            pending: HashMap::new(),
            report: WalkReport::default(),
            notify: None,
        }
    }

    /// Recursive listing of the tree `root`, blobs included.
    pub fn tree(root: ObjectId) -> Self {
        Self::new(Mode::Tree { blobs: true }, vec![root])
    }

    /// The commit `root` and its ancestors.
    pub fn commits(root: ObjectId) -> Self {
        Self::new(Mode::Commits, vec![root])
    }

    /// Fetch exactly these ids, whatever their kind.
    pub fn objects(ids: impl IntoIterator<Item = ObjectId>) -> Self {
        Self::new(Mode::Objects, ids.into_iter().collect())
    }

    /// Stop loading below depth `depth`.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Whether a tree walk also fetches blobs. Ignored by other walks.
    pub fn blobs(mut self, blobs: bool) -> Self {
        if let Mode::Tree { .. } = self.mode {
            self.mode = Mode::Tree { blobs };
        }
        self
    }

    /// Attach a handle that resolves when the walk finishes or is aborted.
    pub fn with_notify(mut self) -> (Self, WalkHandle) {
        let (tx, rx) = oneshot::channel();
        self.notify = Some(tx);
        (self, WalkHandle { rx })
    }

    /// Progress so far.
    pub fn report(&self) -> &WalkReport {
        &self.report
    }

    fn expands(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth < max)
    }

    /// Record that `id` was reached at `depth`, keeping the shallowest.
    fn visit(&mut self, id: ObjectId, depth: usize) -> Visit {
        match self.depths.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(depth);
                Visit::First
            }
            Entry::Occupied(mut slot) if depth < *slot.get() => {
                slot.insert(depth);
                Visit::Shallower
            }
            Entry::Occupied(_) => Visit::Again,
        }
    }

    fn request(&mut self, id: ObjectId, kind: Option<ObjectKind>, cx: &mut TaskContext<'_>) {
        self.pending.insert(id, kind);
        cx.request(id);
    }

    fn visit_tree(&mut self, id: ObjectId, depth: usize, cx: &mut TaskContext<'_>) {
        let visit = self.visit(id, depth);
        // An outstanding request picks up the new depth when it arrives.
        if visit == Visit::Again || self.pending.contains_key(&id) {
            return;
        }
        let entry = cx.cache().lookup_cache_tree(id);
        match entry.get() {
            Some(tree) => {
                if visit == Visit::First {
                    self.report.cached += 1;
                }
                if self.expands(depth) {
                    self.descend(tree, depth, cx);
                }
            }
            None if visit == Visit::First => self.request(id, Some(ObjectKind::Tree), cx),
            None => trace!(%id, depth, "tree reached again but not available"),
        }
    }

    fn visit_blob(&mut self, id: ObjectId, depth: usize, cx: &mut TaskContext<'_>) {
        if self.visit(id, depth) != Visit::First {
            return;
        }
        if cx.cache().lookup_cache_blob(id).is_valid() {
            self.report.cached += 1;
        } else {
            self.request(id, Some(ObjectKind::Blob), cx);
        }
    }

    fn visit_commit(&mut self, id: ObjectId, depth: usize, cx: &mut TaskContext<'_>) {
        let visit = self.visit(id, depth);
        if visit == Visit::Again || self.pending.contains_key(&id) {
            return;
        }
        let entry = cx.cache().lookup_cache_commit(id);
        match entry.get() {
            Some(commit) => {
                if visit == Visit::First {
                    self.report.cached += 1;
                }
                if self.expands(depth) {
                    self.ancestors(commit, depth, cx);
                }
            }
            None if visit == Visit::First => self.request(id, Some(ObjectKind::Commit), cx),
            None => trace!(%id, depth, "commit reached again but not available"),
        }
    }

    fn visit_object(&mut self, id: ObjectId, cx: &mut TaskContext<'_>) {
        if self.visit(id, 0) != Visit::First {
            return;
        }
        let cache = cx.cache();
        let valid = cache.peek_blob(&id).is_some_and(|e| e.is_valid())
            || cache.peek_tree(&id).is_some_and(|e| e.is_valid())
            || cache.peek_commit(&id).is_some_and(|e| e.is_valid());
        if valid {
            self.report.cached += 1;
        } else {
            self.request(id, None, cx);
        }
    }

    fn descend(&mut self, tree: &Tree, depth: usize, cx: &mut TaskContext<'_>) {
        let Mode::Tree { blobs } = self.mode else {
            return;
        };
        for entry in &tree.entries {
            if entry.mode == EntryMode::Submodule {
                trace!(name = %entry.name, "skipping submodule");
                continue;
            }
            match entry.kind() {
                EntryKind::Tree => self.visit_tree(entry.id, depth + 1, cx),
                EntryKind::Blob if blobs => self.visit_blob(entry.id, depth + 1, cx),
                EntryKind::Blob => {}
            }
        }
    }

    fn ancestors(&mut self, commit: &Commit, depth: usize, cx: &mut TaskContext<'_>) {
        for parent in &commit.parents {
            self.visit_commit(*parent, depth + 1, cx);
        }
    }

    /// Account for one reply of kind `kind`.
    fn arrived(&mut self, id: ObjectId, kind: ObjectKind) -> Arrival {
        let Some(expected) = self.pending.remove(&id) else {
            trace!(%id, "reply for an id this walk did not request");
            return Arrival::Unrequested;
        };
        match expected {
            Some(expected) if expected != kind => {
                debug!(%id, %expected, got = %kind, "reply kind differs from request");
                self.report.mismatched.push(id);
                Arrival::Mismatched
            }
            _ => {
                self.report.fetched += 1;
                Arrival::Expected(self.depths.get(&id).copied().unwrap_or(0))
            }
        }
    }

    fn settle(&mut self, cx: &mut TaskContext<'_>) {
        if self.pending.is_empty() {
            debug!(
                fetched = self.report.fetched,
                cached = self.report.cached,
                missing = self.report.missing.len(),
                mismatched = self.report.mismatched.len(),
                "walk finished"
            );
            cx.finish();
            if let Some(tx) = self.notify.take() {
                let _ = tx.send(Ok(self.report.clone()));
            }
        }
    }
}

impl Task for Walk {
    fn name(&self) -> &str {
        match self.mode {
            Mode::Objects => "walk-objects",
            Mode::Tree { .. } => "walk-tree",
            Mode::Commits => "walk-commits",
        }
    }

    fn start(&mut self, cx: &mut TaskContext<'_>) {
        for root in std::mem::take(&mut self.roots) {
            match self.mode {
                Mode::Objects => self.visit_object(root, cx),
                Mode::Tree { .. } => self.visit_tree(root, 0, cx),
                Mode::Commits => self.visit_commit(root, 0, cx),
            }
        }
        self.settle(cx);
    }

    fn on_commit(&mut self, entry: &EntryRef<Commit>, cx: &mut TaskContext<'_>) {
        match self.arrived(entry.id(), ObjectKind::Commit) {
            Arrival::Unrequested => return,
            Arrival::Mismatched => {}
            Arrival::Expected(depth) => {
                if self.mode == Mode::Commits && self.expands(depth) {
                    if let Some(commit) = entry.get() {
                        self.ancestors(commit, depth, cx);
                    }
                }
            }
        }
        self.settle(cx);
    }

    fn on_tree(&mut self, entry: &EntryRef<Tree>, cx: &mut TaskContext<'_>) {
        match self.arrived(entry.id(), ObjectKind::Tree) {
            Arrival::Unrequested => return,
            Arrival::Mismatched => {}
            // Children are requested before this reply is settled, so the
            // outstanding count cannot reach zero early.
            Arrival::Expected(depth) => {
                if self.expands(depth) {
                    if let Some(tree) = entry.get() {
                        self.descend(tree, depth, cx);
                    }
                }
            }
        }
        self.settle(cx);
    }

    fn on_blob(&mut self, entry: &EntryRef<Blob>, cx: &mut TaskContext<'_>) {
        if self.arrived(entry.id(), ObjectKind::Blob) != Arrival::Unrequested {
            self.settle(cx);
        }
    }

    fn on_missing(&mut self, id: ObjectId, cx: &mut TaskContext<'_>) {
        if self.pending.remove(&id).is_some() {
            self.report.missing.push(id);
            self.settle(cx);
        }
    }

    fn on_abort(&mut self, reason: &EngineError) {
        if let Some(tx) = self.notify.take() {
            let _ = tx.send(Err(EngineError::TaskAborted(reason.to_string())));
        }
    }
}

/// Resolves to the report of a walk submitted with [`Walk::with_notify`].
#[derive(Debug)]
pub struct WalkHandle {
    rx: oneshot::Receiver<EngineResult<WalkReport>>,
}

impl WalkHandle {
    pub async fn wait(self) -> EngineResult<WalkReport> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(EngineError::TaskAborted("walk dropped before finishing".into())))
    }
}
