use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds the memory subsystem distinguishes at its seams.
///
/// Orchestration code (turn handling, CLI) wraps these in `anyhow`; the
/// typed enum exists so the archive and the retrieve tool can tell a
/// missing chunk apart from a damaged one.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("chunk {0} not found")]
    NotFound(String),

    #[error("chunk {id} is corrupt: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("chunk {0} already exists")]
    ChunkExists(String),

    #[error("storage i/o failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("summarization provider failed: {0}")]
    Provider(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("cold storage is not configured")]
    NotConfigured,
}

impl MemoryError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(id: impl Into<String>, reason: impl ToString) -> Self {
        Self::Corrupt {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
