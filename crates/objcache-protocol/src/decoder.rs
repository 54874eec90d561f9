use objcache_store::{Blob, Commit, Tree};
use objcache_types::{ObjectId, ObjectKind};
use tracing::trace;

use crate::declaration::Declaration;
use crate::error::ProtocolResult;
use crate::state::{ParseState, Step};
use crate::states::{BlobState, CommitState, HeaderLine, HeaderState, TreeState};

/// Default upper bound on a header line, in bytes.
pub const DEFAULT_MAX_HEADER_LEN: usize = 512;

/// Default upper bound on one line of a commit's header block, in bytes.
///
/// Author, committer and `encoding` lines are free text, so this is far
/// looser than the response header limit.
pub const DEFAULT_MAX_COMMIT_LINE_LEN: usize = 64 * 1024;

/// A fully decoded object payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
}

/// A completed object together with the header that announced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedObject {
    pub declaration: Declaration,
    pub object: Object,
}

impl ParsedObject {
    pub fn id(&self) -> ObjectId {
        self.declaration.id
    }
}

/// Something the decoder recognized in the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A header line announced an object; its payload follows.
    Declared(Declaration),
    /// The store answered that it has no such object.
    Missing(ObjectId),
    /// An announced object's payload was fully consumed.
    Object(ParsedObject),
}

/// Result of one [`BatchDecoder::feed`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    pub events: Vec<DecodeEvent>,
    /// Bytes the caller must drop from the front of its buffer.
    pub consumed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Active {
    Header,
    Commit,
    Tree,
    Blob,
}

/// Incremental decoder for the batch response stream.
///
/// Call [`feed`](Self::feed) with everything buffered so far. The decoder
/// consumes only what it could fully interpret and keeps its own position
/// inside the current object, so the caller drops `consumed` bytes, appends
/// the next read and feeds again. An error means the stream is unusable.
#[derive(Debug)]
pub struct BatchDecoder {
    active: Active,
    current: Option<Declaration>,
    header: HeaderState,
    commit: CommitState,
    tree: TreeState,
    blob: BlobState,
}

impl BatchDecoder {
    pub fn new() -> Self {
        Self::with_max_header_len(DEFAULT_MAX_HEADER_LEN)
    }

    /// Decoder rejecting header lines longer than `max_header_len` bytes.
    pub fn with_max_header_len(max_header_len: usize) -> Self {
        Self::with_limits(max_header_len, DEFAULT_MAX_COMMIT_LINE_LEN)
    }

    /// Decoder with explicit limits for response header lines and for lines
    /// of a commit's header block.
    pub fn with_limits(max_header_len: usize, max_commit_line_len: usize) -> Self {
        Self {
            active: Active::Header,
            current: None,
            header: HeaderState::new(max_header_len),
            commit: CommitState::new(max_commit_line_len),
            tree: TreeState::new(),
            blob: BlobState::new(),
        }
    }

    /// `true` when no object is partially decoded.
    pub fn is_idle(&self) -> bool {
        self.active == Active::Header
    }

    /// The object currently being decoded, if any.
    pub fn current(&self) -> Option<&Declaration> {
        self.current.as_ref()
    }

    /// Decode as much of `buf` as possible.
    pub fn feed(&mut self, buf: &[u8]) -> ProtocolResult<Decoded> {
        let mut decoded = Decoded::default();

        loop {
            let rest = &buf[decoded.consumed..];
            let progressed = match self.active {
                Active::Header => {
                    let step = self.header.consume(rest)?;
                    decoded.consumed += step.consumed;
                    match step.outcome {
                        Some(HeaderLine::Declared(declaration)) => {
                            decoded.events.push(DecodeEvent::Declared(declaration));
                            self.arm(declaration);
                            true
                        }
                        Some(HeaderLine::Missing(id)) => {
                            trace!(%id, "object missing");
                            decoded.events.push(DecodeEvent::Missing(id));
                            true
                        }
                        None => false,
                    }
                }
                Active::Commit => {
                    let step = self.commit.consume(rest)?;
                    self.complete(step, Object::Commit, &mut decoded)
                }
                Active::Tree => {
                    let step = self.tree.consume(rest)?;
                    self.complete(step, Object::Tree, &mut decoded)
                }
                Active::Blob => {
                    let step = self.blob.consume(rest)?;
                    self.complete(step, Object::Blob, &mut decoded)
                }
            };
            if !progressed {
                break;
            }
        }

        Ok(decoded)
    }

    fn arm(&mut self, declaration: Declaration) {
        trace!(%declaration, "object declared");
        self.current = Some(declaration);
        self.active = match declaration.kind {
            ObjectKind::Commit => {
                self.commit.reset(&declaration);
                Active::Commit
            }
            ObjectKind::Tree => {
                self.tree.reset(&declaration);
                Active::Tree
            }
            ObjectKind::Blob | ObjectKind::Tag => {
                self.blob.reset(&declaration);
                Active::Blob
            }
        };
    }

    fn complete<T>(
        &mut self,
        step: Step<T>,
        wrap: fn(T) -> Object,
        decoded: &mut Decoded,
    ) -> bool {
        decoded.consumed += step.consumed;
        let Some(output) = step.outcome else {
            return step.consumed > 0;
        };
        self.active = Active::Header;
        if let Some(declaration) = self.current.take() {
            decoded.events.push(DecodeEvent::Object(ParsedObject {
                declaration,
                object: wrap(output),
            }));
        }
        true
    }
}

impl Default for BatchDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{encode_missing, encode_response, encode_tree};
    use crate::error::ProtocolError;
    use objcache_store::{EntryMode, TreeEntry};
    use proptest::prelude::*;

    const TREE_ID: &str = "7a1e8b5b31087018f993cfd39e104d33344fe86b";
    const FILE_ID: &str = "3b18e512dba79e4c8300dd08aeb37f8e728b8dad";
    const COMMIT_ID: &str = "d6cd1e2bd19e03a81132a23b2025920577f84e37";
    const GONE_ID: &str = "0123456789abcdef0123456789abcdef01234567";

    fn id(hex: &str) -> ObjectId {
        hex.parse().unwrap()
    }

    fn file_entry() -> TreeEntry {
        TreeEntry::new(EntryMode::Regular, "file.txt", id(FILE_ID))
    }

    /// A response stream exercising every state.
    fn stream() -> Vec<u8> {
        let mut out = Vec::new();
        let commit = format!(
            "tree {TREE_ID}\nauthor A <a@x> 1700000000 +0000\ncommitter A <a@x> 1700000000 +0000\n\nfirst\n"
        );
        encode_response(&id(COMMIT_ID), ObjectKind::Commit, commit.as_bytes(), &mut out);
        encode_response(&id(TREE_ID), ObjectKind::Tree, &encode_tree([&file_entry()]), &mut out);
        encode_missing(&id(GONE_ID), &mut out);
        encode_response(&id(FILE_ID), ObjectKind::Blob, b"hello world\n", &mut out);
        encode_response(&id(GONE_ID), ObjectKind::Tree, b"", &mut out);
        out
    }

    fn objects(events: &[DecodeEvent]) -> Vec<&ParsedObject> {
        events
            .iter()
            .filter_map(|event| match event {
                DecodeEvent::Object(object) => Some(object),
                _ => None,
            })
            .collect()
    }

    /// Feed `chunks` the way a reader does: append, decode, drop consumed.
    fn feed_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> (Vec<DecodeEvent>, Vec<u8>) {
        let mut decoder = BatchDecoder::new();
        let mut buffer = Vec::new();
        let mut events = Vec::new();
        for chunk in chunks {
            buffer.extend_from_slice(chunk);
            let decoded = decoder.feed(&buffer).unwrap();
            buffer.drain(..decoded.consumed);
            events.extend(decoded.events);
        }
        (events, buffer)
    }

    // -----------------------------------------------------------------------
    // Whole streams
    // -----------------------------------------------------------------------

    #[test]
    fn single_tree_response() {
        let mut input = Vec::new();
        encode_response(&id(TREE_ID), ObjectKind::Tree, &encode_tree([&file_entry()]), &mut input);

        let mut decoder = BatchDecoder::new();
        let decoded = decoder.feed(&input).unwrap();
        assert_eq!(decoded.consumed, input.len());
        assert!(decoder.is_idle());

        let parsed = objects(&decoded.events);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].id(), id(TREE_ID));
        match &parsed[0].object {
            Object::Tree(tree) => {
                assert_eq!(tree.entries, vec![file_entry()]);
                assert_eq!(tree.entries[0].kind(), objcache_store::EntryKind::Blob);
            }
            other => panic!("expected tree, got {other:?}"),
        }
    }

    #[test]
    fn full_stream_in_one_feed() {
        let input = stream();
        let mut decoder = BatchDecoder::new();
        let decoded = decoder.feed(&input).unwrap();
        assert_eq!(decoded.consumed, input.len());

        let kinds: Vec<_> = decoded
            .events
            .iter()
            .map(|event| match event {
                DecodeEvent::Declared(d) => format!("declared {}", d.kind),
                DecodeEvent::Missing(_) => "missing".to_string(),
                DecodeEvent::Object(_) => "object".to_string(),
            })
            .collect();
        assert_eq!(
            kinds,
            [
                "declared commit",
                "object",
                "declared tree",
                "object",
                "missing",
                "declared blob",
                "object",
                "declared tree",
                "object",
            ]
        );

        let parsed = objects(&decoded.events);
        match &parsed[0].object {
            Object::Commit(commit) => {
                assert_eq!(commit.tree, Some(id(TREE_ID)));
                assert_eq!(commit.message, "first\n");
            }
            other => panic!("expected commit, got {other:?}"),
        }
        assert_eq!(parsed[2].object, Object::Blob(Blob::new(b"hello world\n".to_vec())));
        assert_eq!(parsed[3].object, Object::Tree(Tree::empty()));
    }

    #[test]
    fn missing_consumes_exactly_its_line() {
        let mut input = Vec::new();
        encode_missing(&id(GONE_ID), &mut input);
        let line_len = input.len();
        input.extend_from_slice(b"partial");

        let decoded = BatchDecoder::new().feed(&input).unwrap();
        assert_eq!(decoded.consumed, line_len);
        assert_eq!(decoded.events, vec![DecodeEvent::Missing(id(GONE_ID))]);
    }

    #[test]
    fn empty_feed_makes_no_progress() {
        let decoded = BatchDecoder::new().feed(b"").unwrap();
        assert_eq!(decoded, Decoded::default());
    }

    #[test]
    fn tag_payload_is_kept_as_blob() {
        let mut input = Vec::new();
        encode_response(&id(FILE_ID), ObjectKind::Tag, b"object abc\n", &mut input);
        let decoded = BatchDecoder::new().feed(&input).unwrap();
        let parsed = objects(&decoded.events);
        assert_eq!(parsed[0].declaration.kind, ObjectKind::Tag);
        assert_eq!(parsed[0].object, Object::Blob(Blob::new(b"object abc\n".to_vec())));
    }

    #[test]
    fn unknown_type_is_decoded_as_blob() {
        let input = format!("{FILE_ID} widget 3\nabc\n");
        let decoded = BatchDecoder::new().feed(input.as_bytes()).unwrap();
        assert_eq!(decoded.consumed, input.len());
        assert_eq!(
            objects(&decoded.events)[0].object,
            Object::Blob(Blob::new(b"abc".to_vec()))
        );
    }

    // -----------------------------------------------------------------------
    // Partial input
    // -----------------------------------------------------------------------

    #[test]
    fn payload_state_survives_between_feeds() {
        let mut input = Vec::new();
        encode_response(&id(FILE_ID), ObjectKind::Blob, b"0123456789", &mut input);
        let header_len = input.len() - 11;

        let mut decoder = BatchDecoder::new();
        let first = decoder.feed(&input[..header_len + 4]).unwrap();
        assert_eq!(first.consumed, header_len + 4);
        assert!(!decoder.is_idle());
        assert_eq!(decoder.current().map(|d| d.length), Some(10));

        let second = decoder.feed(&input[header_len + 4..]).unwrap();
        assert_eq!(second.consumed, 7);
        assert!(decoder.is_idle());
        assert_eq!(
            objects(&second.events)[0].object,
            Object::Blob(Blob::new(b"0123456789".to_vec()))
        );
    }

    #[test]
    fn trailing_newline_in_next_read_is_skipped() {
        let mut input = Vec::new();
        encode_response(&id(FILE_ID), ObjectKind::Blob, b"abc", &mut input);
        encode_missing(&id(GONE_ID), &mut input);
        let split = input.iter().position(|&b| b == b'\n').unwrap() + 4;

        let (events, rest) = feed_chunks([&input[..split], &input[split..]]);
        assert!(rest.is_empty());
        assert_eq!(events.last(), Some(&DecodeEvent::Missing(id(GONE_ID))));
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[test]
    fn malformed_header_is_an_error() {
        let err = BatchDecoder::new().feed(b"this is not a header\n").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { state: "header", .. }));
    }

    #[test]
    fn header_limit_is_configurable() {
        let input = format!("{FILE_ID} blob 3\n");
        let err = BatchDecoder::with_max_header_len(8).feed(input.as_bytes()).unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderTooLong { max: 8, .. }));
    }

    #[test]
    fn long_commit_header_line_fits_the_default_limit() {
        let author = format!("author {} <a@x> 1 +0000\n", "n".repeat(4096));
        let payload = format!("{author}\nmessage");
        let mut input = Vec::new();
        encode_response(&id(FILE_ID), ObjectKind::Commit, payload.as_bytes(), &mut input);

        let decoded = BatchDecoder::with_max_header_len(64).feed(&input).unwrap();
        assert_eq!(objects(&decoded.events).len(), 1);

        // The limit applies while a line is still waiting for its newline.
        let err = BatchDecoder::with_limits(512, 1024).feed(&input[..2000]).unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderTooLong { state: "commit", max: 1024, .. }));
    }

    #[test]
    fn tree_with_bad_mode_is_an_error() {
        let mut payload = b"12a456 x\0".to_vec();
        payload.extend_from_slice(&[0; 20]);
        let mut input = Vec::new();
        encode_response(&id(TREE_ID), ObjectKind::Tree, &payload, &mut input);
        let err = BatchDecoder::new().feed(&input).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMode(_)));
    }

    // -----------------------------------------------------------------------
    // Chunking independence
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn any_split_decodes_like_one_feed(cuts in proptest::collection::vec(any::<prop::sample::Index>(), 0..12)) {
            let input = stream();
            let (whole, _) = feed_chunks([input.as_slice()]);

            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(input.len() + 1)).collect();
            points.push(0);
            points.push(input.len());
            points.sort_unstable();
            points.dedup();
            let chunks: Vec<&[u8]> = points.windows(2).map(|w| &input[w[0]..w[1]]).collect();

            let (events, rest) = feed_chunks(chunks);
            prop_assert!(rest.is_empty());
            prop_assert_eq!(events, whole);
        }

        #[test]
        fn byte_at_a_time_decodes_like_one_feed(blob in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut input = Vec::new();
            encode_response(&id(FILE_ID), ObjectKind::Blob, &blob, &mut input);
            let (events, rest) = feed_chunks(input.chunks(1));
            prop_assert!(rest.is_empty());
            let parsed = objects(&events);
            prop_assert_eq!(parsed.len(), 1);
            prop_assert_eq!(&parsed[0].object, &Object::Blob(Blob::new(blob)));
        }
    }
}
