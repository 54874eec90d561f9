use std::sync::Arc;

use objcache_protocol::BatchDecoder;
use objcache_store::{Blob, Commit, EntryKind, EntryRef, ObjectCache, Tree, TreeEntry};
use objcache_types::ObjectId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::process::ProcessHandle;
use crate::reader::Reader;
use crate::task::Task;
use crate::walk::{Walk, WalkReport};
use crate::writer::Writer;

/// The fetch engine: a batch process, its reader and writer loops, and the
/// cache they populate.
///
/// Cache lookups never block on the engine. Work is submitted as
/// [`Task`]s, which run one at a time in submission order; the `lookup_*`
/// helpers wrap the built-in [`Walk`] task and await it.
///
/// The engine must be created inside a tokio runtime. Dropping it kills the
/// batch process; [`shutdown`](Self::shutdown) does so in an orderly way.
pub struct Engine {
    cache: Arc<ObjectCache>,
    tasks: mpsc::UnboundedSender<Box<dyn Task>>,
    shutdown: watch::Sender<bool>,
    writer: JoinHandle<EngineResult<()>>,
    reader: JoinHandle<EngineResult<()>>,
    process: Option<ProcessHandle>,
}

impl Engine {
    /// Spawn the batch process described by `config` and start both loops.
    pub fn start(config: &EngineConfig, cache: Arc<ObjectCache>) -> EngineResult<Self> {
        config.validate()?;
        let (process, stdin, stdout) = ProcessHandle::spawn(config)?;
        Ok(Self::launch(stdout, stdin, cache, config, Some(process)))
    }

    /// Run the engine loops over an already connected batch stream.
    pub fn from_streams<R, W>(
        reader: R,
        writer: W,
        cache: Arc<ObjectCache>,
        config: &EngineConfig,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self::launch(reader, writer, cache, config, None)
    }

    fn launch<R, W>(
        reader: R,
        writer: W,
        cache: Arc<ObjectCache>,
        config: &EngineConfig,
        process: Option<ProcessHandle>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (object_tx, object_rx) = mpsc::unbounded_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader = Reader::new(
            reader,
            Arc::clone(&cache),
            object_tx,
            config.read_buffer_size,
            BatchDecoder::with_limits(config.max_header_len, config.max_commit_line_len),
        );
        let writer = Writer::new(writer, Arc::clone(&cache), task_rx, object_rx, shutdown_rx);

        let reader = tokio::spawn(async move {
            let result = reader.run().await;
            if let Err(err) = &result {
                error!(error = %err, "reader stopped");
            }
            result
        });
        let writer = tokio::spawn(async move {
            let result = writer.run().await;
            if let Err(err) = &result {
                error!(error = %err, "writer stopped");
            }
            result
        });

        debug!(read_buffer_size = config.read_buffer_size, "engine loops started");
        Self {
            cache,
            tasks: task_tx,
            shutdown: shutdown_tx,
            writer,
            reader,
            process,
        }
    }

    /// The cache this engine populates.
    pub fn cache(&self) -> &Arc<ObjectCache> {
        &self.cache
    }

    /// Queue a task. It starts once every earlier task has finished.
    pub fn add_task(&self, task: impl Task) -> EngineResult<()> {
        self.tasks
            .send(Box::new(task))
            .map_err(|_| EngineError::Stopped)
    }

    /// Run a walk to completion.
    pub async fn run_walk(&self, walk: Walk) -> EngineResult<WalkReport> {
        let (walk, handle) = walk.with_notify();
        self.add_task(walk)?;
        handle.wait().await
    }

    /// The blob `id`, fetched if it is not cached yet.
    ///
    /// `Ok(None)` means the store does not have it as a blob.
    pub async fn lookup_blob(&self, id: ObjectId) -> EngineResult<Option<EntryRef<Blob>>> {
        if let Some(entry) = valid(self.cache.peek_blob(&id)) {
            return Ok(Some(entry));
        }
        self.run_walk(Walk::objects([id])).await?;
        Ok(valid(self.cache.peek_blob(&id)))
    }

    /// The tree `id` with its subtrees loaded `depth` levels down.
    ///
    /// Blobs are not fetched. `Ok(None)` means the store does not have the
    /// root as a tree.
    pub async fn lookup_tree(&self, id: ObjectId, depth: usize) -> EngineResult<Option<EntryRef<Tree>>> {
        if depth == 0 {
            if let Some(entry) = valid(self.cache.peek_tree(&id)) {
                return Ok(Some(entry));
            }
        }
        self.run_walk(Walk::tree(id).max_depth(depth).blobs(false)).await?;
        Ok(valid(self.cache.peek_tree(&id)))
    }

    /// The commit `id` with `depth` generations of ancestors loaded.
    pub async fn lookup_commit(&self, id: ObjectId, depth: usize) -> EngineResult<Option<EntryRef<Commit>>> {
        if depth == 0 {
            if let Some(entry) = valid(self.cache.peek_commit(&id)) {
                return Ok(Some(entry));
            }
        }
        self.run_walk(Walk::commits(id).max_depth(depth)).await?;
        Ok(valid(self.cache.peek_commit(&id)))
    }

    /// Resolve a `/`-separated path below the tree `root`.
    ///
    /// Trees along the path are fetched as needed. `Ok(None)` means some
    /// component does not exist or is not a directory.
    pub async fn lookup_path(&self, root: ObjectId, path: &str) -> EngineResult<Option<TreeEntry>> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut tree_id = root;

        while let Some(name) = components.next() {
            let Some(tree) = self.lookup_tree(tree_id, 0).await? else {
                return Ok(None);
            };
            let Some(entry) = tree.get().and_then(|t| t.get(name)).cloned() else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some(entry));
            }
            if entry.kind() != EntryKind::Tree {
                return Ok(None);
            }
            tree_id = entry.id;
        }
        Ok(None)
    }

    /// Stop both loops and the batch process.
    ///
    /// The active task and queued tasks are aborted. Returns the first
    /// error that stopped the engine before shutdown was requested, if any.
    pub async fn shutdown(self) -> EngineResult<()> {
        info!("engine shutting down");
        let _ = self.shutdown.send(true);
        let writer = self.writer.await?;

        if let Some(mut process) = self.process {
            process.terminate().await?;
        }
        self.reader.abort();
        let reader = match self.reader.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(err.into()),
        };

        match (writer, reader) {
            (Err(EngineError::StreamClosed), Err(cause)) => Err(cause),
            (Err(err), _) => Err(err),
            (Ok(()), reader) => {
                if let Err(err) = reader {
                    debug!(error = %err, "reader ended during shutdown");
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cache", &self.cache)
            .field("process", &self.process)
            .finish_non_exhaustive()
    }
}

fn valid<T>(entry: Option<EntryRef<T>>) -> Option<EntryRef<T>> {
    entry.filter(|e| e.is_valid())
}
