use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::MemoryError;
use crate::provider::ChatMessage;

pub const CHUNK_FILE_SUFFIX: &str = ".json.gz";

/// The full archive record written to disk as `<id>.json.gz`.
/// Messages are stored verbatim, all roles included; the archive is
/// lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub session_key: String,
    pub msg_range: [usize; 2],
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Lightweight in-memory projection used for system-prompt injection.
/// A ref exists if and only if the corresponding chunk file exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub id: String,
    pub summary: String,
}

#[derive(Default)]
struct IndexState {
    counters: HashMap<String, u64>,
    refs: HashMap<String, Vec<ChunkRef>>,
}

/// Durable chunk archive plus its in-memory index, rebuilt from the
/// storage directory at startup. One instance owns one directory.
pub struct ColdStorage {
    dir: PathBuf,
    index: Mutex<IndexState>,
}

fn chunk_id_from_file_name(name: &str) -> Option<&str> {
    name.strip_suffix(CHUNK_FILE_SUFFIX).filter(|id| !id.is_empty())
}

/// Chunk IDs are exactly 8 lowercase hex characters; anything else is
/// rejected before it can reach the filesystem.
fn validate_chunk_id(id: &str) -> Result<(), MemoryError> {
    let well_formed = id.len() == 8
        && id
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
    if !well_formed {
        return Err(MemoryError::InvalidArgument(format!(
            "invalid chunk id {id:?}: expected 8 lowercase hex characters"
        )));
    }
    Ok(())
}

fn load_chunk_at(dir: &Path, id: &str) -> Result<ChunkRecord, MemoryError> {
    validate_chunk_id(id)?;
    let path = dir.join(format!("{id}{CHUNK_FILE_SUFFIX}"));
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Err(err) => return Err(MemoryError::io(path, err)),
    };

    let gz = GzDecoder::new(file);
    serde_json::from_reader(gz).map_err(|err| MemoryError::corrupt(id, err))
}

impl ColdStorage {
    /// Create (or open) the storage directory and rebuild the index.
    /// A failed rebuild is logged and does not abort startup.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cold storage dir {}", dir.display()))?;

        let storage = Self {
            dir,
            index: Mutex::new(IndexState::default()),
        };
        if let Err(err) = storage.rebuild_index() {
            warn!(dir = %storage.dir.display(), error = %err, "cold storage index rebuild failed");
        }
        Ok(storage)
    }

    /// Scan the storage directory and repopulate counters and refs.
    /// Corrupt files are logged and skipped. Safe to call again to
    /// re-sync after external changes; the result is identical for an
    /// unchanged directory.
    pub fn rebuild_index(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?;

        let mut counters: HashMap<String, u64> = HashMap::new();
        let mut dated: HashMap<String, Vec<(DateTime<Utc>, ChunkRef)>> = HashMap::new();

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = chunk_id_from_file_name(name) else {
                continue;
            };

            let record = match load_chunk_at(&self.dir, id) {
                Ok(record) => record,
                Err(err) => {
                    warn!(file = name, error = %err, "skipping chunk during index rebuild");
                    continue;
                }
            };

            *counters.entry(record.session_key.clone()).or_default() += 1;
            dated.entry(record.session_key).or_default().push((
                record.created_at,
                ChunkRef {
                    id: record.id,
                    summary: record.summary,
                },
            ));
        }

        // Directory iteration order is not meaningful; order each
        // session's refs by creation time, ties broken by id.
        let mut refs: HashMap<String, Vec<ChunkRef>> = HashMap::with_capacity(dated.len());
        for (key, mut list) in dated {
            list.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.id.cmp(&b.1.id)));
            refs.insert(key, list.into_iter().map(|(_, r)| r).collect());
        }

        let mut index = self.index.lock().expect("index lock poisoned");
        info!(
            dir = %self.dir.display(),
            sessions = counters.len(),
            "cold storage index rebuilt"
        );
        index.counters = counters;
        index.refs = refs;
        Ok(())
    }

    /// Generate a fresh chunk ID for a session: the first 8 hex chars of
    /// sha256(session_key:counter:nanos). The counter makes bursts
    /// within one nanosecond tick unique; the clock makes counters
    /// reused after a restart unique.
    pub fn next_chunk_id(&self, session_key: &str) -> String {
        let counter = {
            let mut index = self.index.lock().expect("index lock poisoned");
            let counter = index.counters.entry(session_key.to_string()).or_default();
            *counter += 1;
            *counter
        };

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let digest = Sha256::digest(format!("{session_key}:{counter}:{nanos}").as_bytes());
        format!("{:x}", digest)[..8].to_string()
    }

    /// Write a chunk atomically and add it to the in-memory index.
    ///
    /// The record is gzip-compressed JSON, written to a temp file in the
    /// storage directory, fsynced, and renamed into place; the rename is
    /// the commit point. An existing target means an ID collision and
    /// surfaces as `ChunkExists` so the caller can retry with a fresh ID.
    pub fn save_chunk(&self, record: &ChunkRecord) -> Result<(), MemoryError> {
        validate_chunk_id(&record.id)?;
        let data = serde_json::to_vec(record)
            .map_err(|err| MemoryError::InvalidArgument(format!("encode chunk: {err}")))?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|err| MemoryError::io(&self.dir, err))?;
        let tmp_path = tmp.path().to_path_buf();
        {
            let mut gz = GzEncoder::new(tmp.as_file_mut(), Compression::default());
            gz.write_all(&data)
                .map_err(|err| MemoryError::io(&tmp_path, err))?;
            let _ = gz
                .finish()
                .map_err(|err| MemoryError::io(&tmp_path, err))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|err| MemoryError::io(&tmp_path, err))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o644);
            tmp.as_file()
                .set_permissions(perms)
                .map_err(|err| MemoryError::io(tmp.path(), err))?;
        }

        let dest = self.dir.join(format!("{}{CHUNK_FILE_SUFFIX}", record.id));
        tmp.persist_noclobber(&dest).map_err(|err| {
            if err.error.kind() == ErrorKind::AlreadyExists {
                MemoryError::ChunkExists(record.id.clone())
            } else {
                MemoryError::io(&dest, err.error)
            }
        })?;

        let mut index = self.index.lock().expect("index lock poisoned");
        index
            .refs
            .entry(record.session_key.clone())
            .or_default()
            .push(ChunkRef {
                id: record.id.clone(),
                summary: record.summary.clone(),
            });
        Ok(())
    }

    /// Read a chunk back from disk. Distinguishes a missing chunk
    /// (`NotFound`) from an unreadable one (`Corrupt`).
    pub fn load_chunk(&self, id: &str) -> Result<ChunkRecord, MemoryError> {
        load_chunk_at(&self.dir, id)
    }

    /// Ordered chunk refs for a session, as a defensive copy.
    pub fn list_refs(&self, session_key: &str) -> Vec<ChunkRef> {
        let index = self.index.lock().expect("index lock poisoned");
        index.refs.get(session_key).cloned().unwrap_or_default()
    }

    /// Per-session ref counts, for operator reporting.
    pub fn session_ref_counts(&self) -> Vec<(String, usize)> {
        let index = self.index.lock().expect("index lock poisoned");
        let mut out: Vec<(String, usize)> = index
            .refs
            .iter()
            .map(|(key, refs)| (key.clone(), refs.len()))
            .collect();
        out.sort();
        out
    }
}
