use objcache_store::{Commit, Signature};
use objcache_types::ObjectId;
use tracing::trace;

use crate::declaration::Declaration;
use crate::error::{ProtocolError, ProtocolResult};
use crate::state::{trailing_newline, ParseState, Step};

/// Parses commit headers line by line, then copies the message.
///
/// Header lines are only interpreted once complete. `tree`, `parent`,
/// `author` and `committer` are kept; every other header (including
/// continuation lines of multi-line headers such as `gpgsig`) is skipped.
/// The first empty line ends the headers and the rest of the declared
/// payload is the message.
#[derive(Debug)]
pub struct CommitState {
    max_line: usize,
    remaining: usize,
    in_message: bool,
    commit: Commit,
    message: Vec<u8>,
}

impl CommitState {
    pub fn new(max_line: usize) -> Self {
        Self {
            max_line,
            remaining: 0,
            in_message: false,
            commit: Commit::default(),
            message: Vec::new(),
        }
    }

    fn header_line(&mut self, line: &[u8]) -> ProtocolResult<()> {
        if line.first() == Some(&b' ') {
            return Ok(());
        }
        let Some(split) = line.iter().position(|&b| b == b' ') else {
            trace!(line = %String::from_utf8_lossy(line), "skipping commit header without value");
            return Ok(());
        };
        let (key, value) = (&line[..split], &line[split + 1..]);

        match key {
            b"tree" => self.commit.tree = Some(self.object_id(value)?),
            b"parent" => {
                let parent = self.object_id(value)?;
                self.commit.parents.push(parent);
            }
            b"author" => self.commit.author = self.signature(value),
            b"committer" => self.commit.committer = self.signature(value),
            _ => {}
        }
        Ok(())
    }

    fn object_id(&self, value: &[u8]) -> ProtocolResult<ObjectId> {
        ObjectId::from_hex(value).map_err(|source| ProtocolError::InvalidId {
            state: self.name(),
            source,
        })
    }

    fn signature(&self, value: &[u8]) -> Option<Signature> {
        let text = String::from_utf8_lossy(value);
        let signature = Signature::parse(&text);
        if signature.is_none() {
            trace!(value = %text, "unparseable commit signature");
        }
        signature
    }

    fn finish(&mut self) -> Commit {
        let mut commit = std::mem::take(&mut self.commit);
        commit.message = String::from_utf8_lossy(&std::mem::take(&mut self.message)).into_owned();
        commit
    }
}

impl ParseState for CommitState {
    type Output = Commit;

    fn name(&self) -> &'static str {
        "commit"
    }

    fn reset(&mut self, declaration: &Declaration) {
        self.remaining = declaration.length;
        self.in_message = false;
        self.commit = Commit::default();
        self.message.clear();
    }

    fn consume(&mut self, buf: &[u8]) -> ProtocolResult<Step<Commit>> {
        let mut pos = 0;

        while !self.in_message && self.remaining > 0 {
            let rest = &buf[pos..];
            let window = &rest[..rest.len().min(self.remaining)];
            let Some(end) = window.iter().position(|&b| b == b'\n') else {
                if window.len() == self.remaining {
                    return Err(ProtocolError::Malformed {
                        state: self.name(),
                        reason: "header line runs past the declared length".into(),
                    });
                }
                if window.len() > self.max_line {
                    return Err(ProtocolError::HeaderTooLong {
                        state: self.name(),
                        len: window.len(),
                        max: self.max_line,
                    });
                }
                break;
            };

            let line = &window[..end];
            if line.is_empty() {
                self.in_message = true;
            } else {
                self.header_line(line)?;
            }
            pos += end + 1;
            self.remaining -= end + 1;
        }

        if self.in_message {
            let take = (buf.len() - pos).min(self.remaining);
            self.message.extend_from_slice(&buf[pos..pos + take]);
            pos += take;
            self.remaining -= take;
        }

        if self.remaining > 0 {
            return Ok(Step::progress(pos));
        }
        pos += trailing_newline(&buf[pos..]);
        Ok(Step::done(pos, self.finish()))
    }
}
