use objcache_store::Blob;

use crate::declaration::Declaration;
use crate::error::ProtocolResult;
use crate::state::{trailing_newline, ParseState, Step};

/// Cap on the up-front allocation for a declared payload.
const MAX_PREALLOC: usize = 1 << 20;

/// Copies exactly the declared number of payload bytes.
#[derive(Debug, Default)]
pub struct BlobState {
    remaining: usize,
    data: Vec<u8>,
}

impl BlobState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseState for BlobState {
    type Output = Blob;

    fn name(&self) -> &'static str {
        "blob"
    }

    fn reset(&mut self, declaration: &Declaration) {
        self.remaining = declaration.length;
        self.data = Vec::with_capacity(declaration.length.min(MAX_PREALLOC));
    }

    fn consume(&mut self, buf: &[u8]) -> ProtocolResult<Step<Blob>> {
        let take = buf.len().min(self.remaining);
        self.data.extend_from_slice(&buf[..take]);
        self.remaining -= take;

        if self.remaining > 0 {
            return Ok(Step::progress(take));
        }
        let consumed = take + trailing_newline(&buf[take..]);
        Ok(Step::done(consumed, Blob::new(std::mem::take(&mut self.data))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcache_types::{ObjectId, ObjectKind};

    fn armed(length: usize) -> BlobState {
        let mut state = BlobState::new();
        state.reset(&Declaration::new(ObjectId::null(), ObjectKind::Blob, length));
        state
    }

    #[test]
    fn copies_across_chunks() {
        let mut state = armed(5);
        assert_eq!(state.consume(b"he").unwrap(), Step::progress(2));
        let step = state.consume(b"llo\nnext").unwrap();
        assert_eq!(step.consumed, 4);
        assert_eq!(step.outcome, Some(Blob::new(b"hello".to_vec())));
    }

    #[test]
    fn payload_may_contain_newlines_and_nuls() {
        let mut state = armed(4);
        let step = state.consume(b"\n\0\n\0\n").unwrap();
        assert_eq!(step.consumed, 5);
        assert_eq!(step.outcome.unwrap().data, b"\n\0\n\0");
    }

    #[test]
    fn empty_payload_finishes_on_empty_buffer() {
        let step = armed(0).consume(b"").unwrap();
        assert_eq!(step, Step::done(0, Blob::default()));
    }
}
