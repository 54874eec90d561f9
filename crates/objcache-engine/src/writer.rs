use std::sync::Arc;

use objcache_protocol::encode_request;
use objcache_store::ObjectCache;
use objcache_types::ObjectId;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace, warn};

use crate::error::{EngineError, EngineResult};
use crate::reader::Completed;
use crate::task::{Task, TaskContext};

pub(crate) type TaskQueue = mpsc::UnboundedReceiver<Box<dyn Task>>;

/// Runs tasks one at a time and routes completed objects to the active one.
///
/// While idle the writer waits for a task, a stray object or shutdown.
/// While a task is active it only waits for objects or shutdown, so queued
/// tasks start strictly in submission order.
pub(crate) struct Writer<W> {
    stream: W,
    cache: Arc<ObjectCache>,
    tasks: TaskQueue,
    completed: mpsc::UnboundedReceiver<Completed>,
    shutdown: watch::Receiver<bool>,
    active: Option<Box<dyn Task>>,
    line: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    pub(crate) fn new(
        stream: W,
        cache: Arc<ObjectCache>,
        tasks: TaskQueue,
        completed: mpsc::UnboundedReceiver<Completed>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            cache,
            tasks,
            completed,
            shutdown,
            active: None,
            line: Vec::new(),
        }
    }

    /// Serve tasks until shutdown, the reader stops or a write fails.
    ///
    /// Whatever ends the loop, the active task and every queued task get
    /// `on_abort` before this returns. Shutdown is `Ok`.
    pub(crate) async fn run(mut self) -> EngineResult<()> {
        let reason = self.serve().await;
        self.abort_all(&reason);
        match reason {
            EngineError::Stopped => Ok(()),
            err => Err(err),
        }
    }

    async fn serve(&mut self) -> EngineError {
        loop {
            let step = if self.active.is_none() {
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return EngineError::Stopped,
                    task = self.tasks.recv() => match task {
                        Some(task) => self.activate(task).await,
                        None => return EngineError::Stopped,
                    },
                    completed = self.completed.recv() => match completed {
                        Some(completed) => {
                            debug!(id = %completed.id(), "object arrived with no active task");
                            Ok(())
                        }
                        None => return EngineError::StreamClosed,
                    },
                }
            } else {
                tokio::select! {
                    biased;
                    _ = self.shutdown.changed() => return EngineError::Stopped,
                    completed = self.completed.recv() => match completed {
                        Some(completed) => self.deliver(completed).await,
                        None => return EngineError::StreamClosed,
                    },
                }
            };
            if let Err(err) = step {
                return err;
            }
        }
    }

    async fn activate(&mut self, mut task: Box<dyn Task>) -> EngineResult<()> {
        debug!(task = task.name(), "task started");
        let cache = Arc::clone(&self.cache);
        let mut cx = TaskContext::new(&cache);
        task.start(&mut cx);
        let (requests, finished) = cx.into_parts();
        self.settle(task, requests, finished).await
    }

    async fn deliver(&mut self, completed: Completed) -> EngineResult<()> {
        let Some(mut task) = self.active.take() else {
            return Ok(());
        };
        let cache = Arc::clone(&self.cache);
        let mut cx = TaskContext::new(&cache);
        match &completed {
            Completed::Commit(entry) => task.on_commit(entry, &mut cx),
            Completed::Tree(entry) => task.on_tree(entry, &mut cx),
            Completed::Blob(entry) => task.on_blob(entry, &mut cx),
            Completed::Missing(id) => task.on_missing(*id, &mut cx),
        }
        let (requests, finished) = cx.into_parts();
        self.settle(task, requests, finished).await
    }

    /// Keep the task active unless it finished, then send its requests.
    async fn settle(
        &mut self,
        task: Box<dyn Task>,
        requests: Vec<ObjectId>,
        finished: bool,
    ) -> EngineResult<()> {
        if finished {
            debug!(task = task.name(), "task finished");
        } else {
            self.active = Some(task);
        }
        self.send_requests(&requests).await
    }

    async fn send_requests(&mut self, ids: &[ObjectId]) -> EngineResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.line.clear();
        for id in ids {
            encode_request(id, &mut self.line);
        }
        self.stream
            .write_all(&self.line)
            .await
            .map_err(EngineError::Write)?;
        self.stream.flush().await.map_err(EngineError::Write)?;
        trace!(count = ids.len(), "requests written");
        Ok(())
    }

    fn abort_all(&mut self, reason: &EngineError) {
        if let Some(mut task) = self.active.take() {
            warn!(task = task.name(), %reason, "aborting active task");
            task.on_abort(reason);
        }
        self.tasks.close();
        while let Ok(mut task) = self.tasks.try_recv() {
            debug!(task = task.name(), %reason, "dropping queued task");
            task.on_abort(reason);
        }
    }
}
