use objcache_types::{ObjectId, ObjectKind};

use crate::declaration::Declaration;
use crate::error::{ProtocolError, ProtocolResult};
use crate::state::{ParseState, Step};

/// What a complete header line announced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeaderLine {
    /// An object follows with exactly `length` payload bytes.
    Declared(Declaration),
    /// The store has no object with this id. No payload follows.
    Missing(ObjectId),
}

/// Recognizes `<id> <type> <length>\n` and `<id> missing\n`.
#[derive(Debug)]
pub struct HeaderState {
    max_len: usize,
}

impl HeaderState {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    fn parse_line(&self, line: &[u8]) -> ProtocolResult<HeaderLine> {
        let mut fields = line.split(|&b| b == b' ');
        let (Some(id), Some(second)) = (fields.next(), fields.next()) else {
            return Err(self.malformed(line));
        };
        let id = ObjectId::from_hex(id).map_err(|source| ProtocolError::InvalidId {
            state: self.name(),
            source,
        })?;

        match (second, fields.next(), fields.next()) {
            // `ambiguous` only answers abbreviated names; treat it like missing.
            (b"missing" | b"ambiguous", None, None) => Ok(HeaderLine::Missing(id)),
            (kind, Some(length), None) => {
                let length = std::str::from_utf8(length)
                    .ok()
                    .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| {
                        ProtocolError::InvalidLength(String::from_utf8_lossy(length).into_owned())
                    })?;
                let kind = ObjectKind::from_wire(kind);
                Ok(HeaderLine::Declared(Declaration::new(id, kind, length)))
            }
            _ => Err(self.malformed(line)),
        }
    }

    fn malformed(&self, line: &[u8]) -> ProtocolError {
        ProtocolError::Malformed {
            state: self.name(),
            reason: format!("unexpected line {:?}", String::from_utf8_lossy(line)),
        }
    }
}

impl ParseState for HeaderState {
    type Output = HeaderLine;

    fn name(&self) -> &'static str {
        "header"
    }

    fn reset(&mut self, _declaration: &Declaration) {}

    fn consume(&mut self, buf: &[u8]) -> ProtocolResult<Step<HeaderLine>> {
        // A payload's trailing newline may arrive after the payload state
        // already finished.
        let skip = usize::from(buf.first() == Some(&b'\n'));
        let rest = &buf[skip..];

        let Some(end) = rest.iter().position(|&b| b == b'\n') else {
            if rest.len() > self.max_len {
                return Err(ProtocolError::HeaderTooLong {
                    state: self.name(),
                    len: rest.len(),
                    max: self.max_len,
                });
            }
            return Ok(Step::pending());
        };
        if end > self.max_len {
            return Err(ProtocolError::HeaderTooLong {
                state: self.name(),
                len: end,
                max: self.max_len,
            });
        }

        let line = self.parse_line(&rest[..end])?;
        Ok(Step::done(skip + end + 1, line))
    }
}
