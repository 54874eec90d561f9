use std::borrow::Cow;

use chrono::{DateTime, FixedOffset};
use objcache_types::ObjectId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object. The cache never interprets blob bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// The content as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Size of the content in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Mode bit marking a tree child.
const MODE_TREE_BIT: u32 = 0o040000;
/// Mode bit marking a blob child.
const MODE_BLOB_BIT: u32 = 0o100000;

/// Which cache map a tree child lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    /// Classify a raw octal mode: blob if the blob bit is set, else tree.
    pub fn from_mode_bits(bits: u32) -> Self {
        if bits & MODE_BLOB_BIT != 0 {
            Self::Blob
        } else {
            Self::Tree
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
        }
    }
}

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree / directory (0o040000).
    Directory,
    /// Submodule commit link (0o160000).
    Submodule,
    /// Any other mode, kept verbatim.
    Other(u32),
}

impl EntryMode {
    /// Octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Directory => 0o040000,
            Self::Submodule => 0o160000,
            Self::Other(bits) => *bits,
        }
    }

    /// Classify an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Self {
        match bits {
            0o100644 => Self::Regular,
            0o100755 => Self::Executable,
            0o120000 => Self::Symlink,
            0o040000 => Self::Directory,
            0o160000 => Self::Submodule,
            other => Self::Other(other),
        }
    }

    /// The cache map the child belongs in.
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_mode_bits(self.mode_bits())
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode as recorded in the tree.
    pub mode: EntryMode,
    /// Entry name (filename or directory name).
    pub name: String,
    /// Id of the child; resolve it through the cache map for `kind()`.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            id,
        }
    }

    /// Which kind of cache entry the child is.
    pub fn kind(&self) -> EntryKind {
        self.mode.kind()
    }
}

/// Directory listing object.
///
/// Entries keep the order the store returned them in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a tree with the given entries.
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries that refer to blobs.
    pub fn blobs(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind() == EntryKind::Blob)
    }

    /// Entries that refer to subtrees.
    pub fn subtrees(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter().filter(|e| e.kind() == EntryKind::Tree)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Identity and time stamp from an `author` or `committer` header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    /// Parse `Name <email> <unix-seconds> <+hhmm>`.
    ///
    /// Returns `None` when the line does not follow that shape.
    pub fn parse(value: &str) -> Option<Self> {
        let (ident, rest) = value.rsplit_once('>')?;
        let (name, email) = ident.split_once('<')?;
        let mut parts = rest.split_whitespace();
        let seconds: i64 = parts.next()?.parse().ok()?;
        let offset = parse_offset(parts.next().unwrap_or("+0000"))?;
        let when = DateTime::from_timestamp(seconds, 0)?.with_timezone(&offset);
        Some(Self {
            name: name.trim().to_string(),
            email: email.to_string(),
            when,
        })
    }
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    let (sign, digits) = match tz.as_bytes().first()? {
        b'+' => (1, &tz[1..]),
        b'-' => (-1, &tz[1..]),
        _ => (1, tz),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A commit object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Root tree of the commit.
    pub tree: Option<ObjectId>,
    /// Parent commits, in header order.
    pub parents: Vec<ObjectId>,
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    /// Everything after the blank line that ends the header.
    pub message: String,
}

impl Commit {
    /// Commit time: the committer stamp, falling back to the author stamp.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.committer
            .as_ref()
            .or(self.author.as_ref())
            .map(|sig| sig.when)
    }

    /// First line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    /// Returns `true` for a commit without parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}
