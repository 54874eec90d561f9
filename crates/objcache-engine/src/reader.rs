use std::sync::Arc;

use bytes::{Buf, BytesMut};
use objcache_protocol::{BatchDecoder, DecodeEvent, Object, ParsedObject};
use objcache_store::{Blob, Commit, EntryKind, EntryRef, ObjectCache, Tree};
use objcache_types::ObjectId;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{EngineError, EngineResult};

/// An object the reader finished, already stored in the cache.
#[derive(Clone, Debug)]
pub(crate) enum Completed {
    Commit(EntryRef<Commit>),
    Tree(EntryRef<Tree>),
    Blob(EntryRef<Blob>),
    Missing(ObjectId),
}

impl Completed {
    pub(crate) fn id(&self) -> ObjectId {
        match self {
            Self::Commit(entry) => entry.id(),
            Self::Tree(entry) => entry.id(),
            Self::Blob(entry) => entry.id(),
            Self::Missing(id) => *id,
        }
    }
}

/// Drives the decoder over the batch process output.
///
/// Every completed object is stored in the cache (children referenced by
/// trees and commits get placeholders) and then forwarded to the writer.
pub(crate) struct Reader<R> {
    stream: R,
    buffer: BytesMut,
    read_size: usize,
    decoder: BatchDecoder,
    cache: Arc<ObjectCache>,
    completed: mpsc::UnboundedSender<Completed>,
}

impl<R: AsyncRead + Unpin> Reader<R> {
    pub(crate) fn new(
        stream: R,
        cache: Arc<ObjectCache>,
        completed: mpsc::UnboundedSender<Completed>,
        read_size: usize,
        decoder: BatchDecoder,
    ) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(read_size),
            read_size,
            decoder,
            cache,
            completed,
        }
    }

    /// Read until the stream ends, a read fails or the input is malformed.
    ///
    /// A clean end of stream between responses returns `Ok`. Returning in
    /// any way drops the sender, which tells the writer no more objects
    /// will arrive.
    pub(crate) async fn run(mut self) -> EngineResult<()> {
        loop {
            self.buffer.reserve(self.read_size);
            let read = self
                .stream
                .read_buf(&mut self.buffer)
                .await
                .map_err(EngineError::Read)?;
            if read == 0 {
                return self.end_of_stream();
            }
            trace!(read, buffered = self.buffer.len(), "batch output read");

            let decoded = self.decoder.feed(&self.buffer)?;
            self.buffer.advance(decoded.consumed);
            for event in decoded.events {
                if !self.dispatch(event) {
                    debug!("writer gone, reader stopping");
                    return Ok(());
                }
            }
        }
    }

    fn end_of_stream(&self) -> EngineResult<()> {
        let leftover = &self.buffer[..];
        if self.decoder.is_idle() && (leftover.is_empty() || leftover == b"\n") {
            info!("batch stream closed");
            return Ok(());
        }
        Err(EngineError::Truncated {
            buffered: leftover.len(),
        })
    }

    /// Returns `false` once the writer has hung up.
    fn dispatch(&self, event: DecodeEvent) -> bool {
        let completed = match event {
            DecodeEvent::Declared(declaration) => {
                debug!(id = %declaration.id, kind = %declaration.kind, len = declaration.length, "receiving object");
                return true;
            }
            DecodeEvent::Missing(id) => {
                warn!(%id, "object missing from store");
                Completed::Missing(id)
            }
            DecodeEvent::Object(parsed) => publish(&self.cache, parsed),
        };
        self.completed.send(completed).is_ok()
    }
}

/// Store a parsed object and create placeholders for what it references.
pub(crate) fn publish(cache: &ObjectCache, parsed: ParsedObject) -> Completed {
    let id = parsed.id();
    match parsed.object {
        Object::Commit(commit) => {
            if let Some(tree) = commit.tree {
                cache.lookup_cache_tree(tree);
            }
            for parent in &commit.parents {
                cache.lookup_cache_commit(*parent);
            }
            Completed::Commit(cache.set_commit(id, commit))
        }
        Object::Tree(tree) => {
            for entry in &tree.entries {
                match entry.kind() {
                    EntryKind::Blob => {
                        cache.lookup_cache_blob(entry.id);
                    }
                    EntryKind::Tree => {
                        cache.lookup_cache_tree(entry.id);
                    }
                }
            }
            Completed::Tree(cache.set_tree(id, tree))
        }
        Object::Blob(blob) => Completed::Blob(cache.set_blob(id, blob)),
    }
}
