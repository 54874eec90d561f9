use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration for the batch process and the engine loops.
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes:
///
/// ```toml
/// repository = "/srv/music"
/// read_buffer_size = 65536
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Program answering batch requests.
    pub program: String,
    /// Arguments passed to `program`.
    pub args: Vec<String>,
    /// Working directory of the batch process.
    pub repository: PathBuf,
    /// Minimum free space reserved before every read, in bytes.
    pub read_buffer_size: usize,
    /// Longest accepted response header line, in bytes.
    pub max_header_len: usize,
    /// Longest accepted line in a commit's header block, in bytes.
    ///
    /// A longer author, committer or `encoding` line is a protocol error
    /// and stops the engine.
    pub max_commit_line_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "git".into(),
            args: vec!["cat-file".into(), "--batch".into()],
            repository: PathBuf::from("."),
            read_buffer_size: 8 * 1024,
            max_header_len: objcache_protocol::DEFAULT_MAX_HEADER_LEN,
            max_commit_line_len: objcache_protocol::DEFAULT_MAX_COMMIT_LINE_LEN,
        }
    }
}

impl EngineConfig {
    /// Default configuration rooted at `repository`.
    pub fn for_repository(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.program.trim().is_empty() {
            return Err(EngineError::Config("program must not be empty".into()));
        }
        if self.read_buffer_size == 0 {
            return Err(EngineError::Config("read_buffer_size must be positive".into()));
        }
        // A header line is at least a 40-hex id plus " missing".
        if self.max_header_len < 48 {
            return Err(EngineError::Config(format!(
                "max_header_len {} is too small for a header line",
                self.max_header_len
            )));
        }
        // Room for a `tree <id>` line.
        if self.max_commit_line_len < 45 {
            return Err(EngineError::Config(format!(
                "max_commit_line_len {} is too small for a commit header line",
                self.max_commit_line_len
            )));
        }
        Ok(())
    }
}
