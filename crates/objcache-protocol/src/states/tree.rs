use objcache_store::{EntryMode, Tree, TreeEntry};
use objcache_types::{ObjectId, OBJECT_ID_LEN};

use crate::declaration::Declaration;
use crate::error::{ProtocolError, ProtocolResult};
use crate::state::{trailing_newline, ParseState, Step};

/// Longest octal mode accepted in a tree record.
const MAX_MODE_LEN: usize = 7;

/// Parses binary tree records `<octal mode> <name>\0<20-byte id>`.
///
/// A record is only consumed once all of it is buffered, and every record
/// must fit inside the declared payload length.
#[derive(Debug, Default)]
pub struct TreeState {
    remaining: usize,
    entries: Vec<TreeEntry>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParseState for TreeState {
    type Output = Tree;

    fn name(&self) -> &'static str {
        "tree"
    }

    fn reset(&mut self, declaration: &Declaration) {
        self.remaining = declaration.length;
        self.entries.clear();
    }

    fn consume(&mut self, buf: &[u8]) -> ProtocolResult<Step<Tree>> {
        let mut pos = 0;
        while self.remaining > 0 {
            let Some((entry, used)) = parse_record(&buf[pos..], self.remaining)? else {
                break;
            };
            self.entries.push(entry);
            pos += used;
            self.remaining -= used;
        }

        if self.remaining > 0 {
            return Ok(Step::progress(pos));
        }
        pos += trailing_newline(&buf[pos..]);
        Ok(Step::done(pos, Tree::new(std::mem::take(&mut self.entries))))
    }
}

/// Parse one record from the front of `rest`.
///
/// Returns `None` when the record is not fully buffered yet.
fn parse_record(rest: &[u8], remaining: usize) -> ProtocolResult<Option<(TreeEntry, usize)>> {
    let window = &rest[..rest.len().min(remaining)];
    let payload_buffered = rest.len() >= remaining;

    let Some(space) = window.iter().position(|&b| b == b' ') else {
        if window.iter().any(|b| !is_octal(b)) || window.len() > MAX_MODE_LEN {
            return Err(ProtocolError::InvalidMode(lossy(window)));
        }
        if payload_buffered {
            return Err(ProtocolError::RecordOverrun {
                needed: remaining + 1,
                remaining,
            });
        }
        return Ok(None);
    };

    let digits = &window[..space];
    if digits.is_empty() || digits.len() > MAX_MODE_LEN || !digits.iter().all(is_octal) {
        return Err(ProtocolError::InvalidMode(lossy(digits)));
    }
    let mode = digits
        .iter()
        .fold(0u32, |acc, &digit| (acc << 3) | u32::from(digit - b'0'));

    let name_start = space + 1;
    let Some(nul) = window[name_start..].iter().position(|&b| b == 0) else {
        if payload_buffered {
            return Err(ProtocolError::RecordOverrun {
                needed: remaining + 1,
                remaining,
            });
        }
        return Ok(None);
    };
    if nul == 0 {
        return Err(ProtocolError::Malformed {
            state: "tree",
            reason: "record with empty name".into(),
        });
    }
    let name_end = name_start + nul;

    let id_start = name_end + 1;
    let end = id_start + OBJECT_ID_LEN;
    if end > remaining {
        return Err(ProtocolError::RecordOverrun {
            needed: end,
            remaining,
        });
    }
    if end > rest.len() {
        return Ok(None);
    }

    let id = ObjectId::from_slice(&rest[id_start..end]).map_err(|source| ProtocolError::InvalidId {
        state: "tree",
        source,
    })?;
    let name = lossy(&rest[name_start..name_end]);
    Ok(Some((TreeEntry::new(EntryMode::from_mode_bits(mode), name, id), end)))
}

fn is_octal(byte: &u8) -> bool {
    (b'0'..=b'7').contains(byte)
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use objcache_store::EntryKind;
    use objcache_types::ObjectKind;

    fn record(mode: &str, name: &str, id: u8) -> Vec<u8> {
        let mut out = format!("{mode} {name}\0").into_bytes();
        out.extend_from_slice(&[id; OBJECT_ID_LEN]);
        out
    }

    fn armed(length: usize) -> TreeState {
        let mut state = TreeState::new();
        state.reset(&Declaration::new(ObjectId::null(), ObjectKind::Tree, length));
        state
    }

    #[test]
    fn parses_records_in_order() {
        let mut payload = record("100644", "zeta.txt", 1);
        payload.extend(record("40000", "alpha", 2));
        payload.extend(record("100755", "run.sh", 3));

        let step = armed(payload.len()).consume(&payload).unwrap();
        assert_eq!(step.consumed, payload.len());
        let tree = step.outcome.unwrap();
        let names: Vec<_> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["zeta.txt", "alpha", "run.sh"]);
        assert_eq!(tree.entries[0].kind(), EntryKind::Blob);
        assert_eq!(tree.entries[1].kind(), EntryKind::Tree);
        assert_eq!(tree.entries[1].id, ObjectId::from_raw([2; OBJECT_ID_LEN]));
        assert_eq!(tree.entries[2].mode, EntryMode::Executable);
    }

    #[test]
    fn empty_tree_finishes_immediately() {
        let step = armed(0).consume(b"").unwrap();
        assert_eq!(step, Step::done(0, Tree::empty()));
    }

    #[test]
    fn partial_record_is_left_unconsumed() {
        let payload = record("100644", "file.txt", 9);
        let mut state = armed(payload.len());
        for cut in [0, 3, 7, 12, payload.len() - 1] {
            assert_eq!(state.consume(&payload[..cut]).unwrap(), Step::progress(0));
        }
        let step = state.consume(&payload).unwrap();
        assert_eq!(step.outcome.unwrap().len(), 1);
    }

    #[test]
    fn id_bytes_may_contain_nul_and_space() {
        let mut payload = b"100644 a\0".to_vec();
        let mut id = [0u8; OBJECT_ID_LEN];
        id[1] = b' ';
        id[3] = b'\n';
        id[19] = 7;
        payload.extend_from_slice(&id);
        let tree = armed(payload.len()).consume(&payload).unwrap().outcome.unwrap();
        assert_eq!(tree.entries[0].id.as_bytes()[1], b' ');
    }

    #[test]
    fn non_octal_mode_is_rejected() {
        let payload = record("10x644", "file", 1);
        assert!(matches!(
            armed(payload.len()).consume(&payload),
            Err(ProtocolError::InvalidMode(mode)) if mode == "10x644"
        ));
        assert!(matches!(
            armed(10).consume(b"1009"),
            Err(ProtocolError::InvalidMode(_))
        ));
    }

    #[test]
    fn record_past_declared_length_is_rejected() {
        let payload = record("100644", "file", 1);
        assert!(matches!(
            armed(payload.len() - 5).consume(&payload),
            Err(ProtocolError::RecordOverrun { .. })
        ));
        assert!(matches!(
            armed(8).consume(b"100644 file"),
            Err(ProtocolError::RecordOverrun { .. })
        ));
    }

    #[test]
    fn empty_name_is_malformed() {
        let payload = record("100644", "", 1);
        assert!(matches!(
            armed(payload.len()).consume(&payload),
            Err(ProtocolError::Malformed { state: "tree", .. })
        ));
    }
}
