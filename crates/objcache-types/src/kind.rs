use serde::{Deserialize, Serialize};

/// The type of an object as announced in a batch header line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A commit: tree, parents, signatures and message.
    Commit,
    /// Directory listing mapping names to child objects.
    Tree,
    /// Raw content.
    Blob,
    /// Annotated tag. Its payload is kept as opaque blob data.
    Tag,
}

impl ObjectKind {
    /// Parse the type token of a header line.
    ///
    /// Unrecognized tokens are treated as [`ObjectKind::Blob`].
    pub fn from_wire(token: &[u8]) -> Self {
        match token {
            b"commit" => Self::Commit,
            b"tree" => Self::Tree,
            b"tag" => Self::Tag,
            _ => Self::Blob,
        }
    }

    /// The token used for this kind on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
