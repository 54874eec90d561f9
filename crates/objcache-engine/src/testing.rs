//! In-process stand-in for a batch object process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use objcache_protocol::{encode_missing, encode_response, encode_tree};
use objcache_store::{EntryMode, ObjectCache, TreeEntry};
use objcache_types::{ObjectId, ObjectKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use crate::config::EngineConfig;
use crate::engine::Engine;

pub(crate) type Requests = Arc<Mutex<Vec<ObjectId>>>;

#[derive(Default)]
pub(crate) struct FakeStore {
    objects: HashMap<ObjectId, (ObjectKind, Vec<u8>)>,
    next: u32,
    reverse: bool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer each batch of buffered requests in reverse order.
    pub(crate) fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    fn insert(&mut self, kind: ObjectKind, payload: Vec<u8>) -> ObjectId {
        self.next += 1;
        let mut raw = [0xaa; 20];
        raw[..4].copy_from_slice(&self.next.to_be_bytes());
        let id = ObjectId::from_raw(raw);
        self.objects.insert(id, (kind, payload));
        id
    }

    pub(crate) fn blob(&mut self, data: &[u8]) -> ObjectId {
        self.insert(ObjectKind::Blob, data.to_vec())
    }

    pub(crate) fn tree(&mut self, entries: &[(&str, EntryMode, ObjectId)]) -> ObjectId {
        let entries: Vec<_> = entries
            .iter()
            .map(|(name, mode, id)| TreeEntry::new(*mode, *name, *id))
            .collect();
        self.insert(ObjectKind::Tree, encode_tree(&entries))
    }

    pub(crate) fn commit(&mut self, tree: ObjectId, parents: &[ObjectId], message: &str) -> ObjectId {
        let mut payload = format!("tree {tree}\n");
        for parent in parents {
            payload.push_str(&format!("parent {parent}\n"));
        }
        payload.push_str("author Test <test@example.com> 1700000000 +0000\n");
        payload.push_str("committer Test <test@example.com> 1700000060 +0000\n\n");
        payload.push_str(message);
        payload.push('\n');
        self.insert(ObjectKind::Commit, payload.into_bytes())
    }

    /// Start an engine connected to this store through a small duplex pipe.
    pub(crate) fn start(self) -> (Engine, Requests) {
        let requests = Requests::default();
        let (client, server) = tokio::io::duplex(64);
        let (client_read, client_write) = tokio::io::split(client);
        let (server_read, server_write) = tokio::io::split(server);
        tokio::spawn(serve(self, Arc::clone(&requests), server_read, server_write));

        let config = EngineConfig {
            read_buffer_size: 7,
            ..EngineConfig::default()
        };
        let engine = Engine::from_streams(
            client_read,
            client_write,
            Arc::new(ObjectCache::new()),
            &config,
        );
        (engine, requests)
    }
}

async fn serve(
    store: FakeStore,
    requests: Requests,
    mut read: ReadHalf<DuplexStream>,
    mut write: WriteHalf<DuplexStream>,
) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        let n = match read.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        pending.extend_from_slice(&chunk[..n]);

        let mut ids = Vec::new();
        while let Some(end) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=end).collect();
            let Ok(id) = ObjectId::from_hex(&line[..end]) else {
                return;
            };
            ids.push(id);
        }
        if store.reverse {
            ids.reverse();
        }

        let mut out = Vec::new();
        for id in ids {
            requests.lock().unwrap().push(id);
            match store.objects.get(&id) {
                Some((kind, payload)) => encode_response(&id, *kind, payload, &mut out),
                None => encode_missing(&id, &mut out),
            }
        }
        if write.write_all(&out).await.is_err() {
            break;
        }
    }
}
