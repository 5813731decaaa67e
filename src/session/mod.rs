use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::provider::ChatMessage;

/// Mutable per-conversation state: the live message history and the
/// append-only rolling summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    pub history: Vec<ChatMessage>,
    pub rolling_summary: String,
}

/// Thread-safe store of sessions, keyed by opaque session key.
///
/// Every mutation is flushed to a per-session JSON file so a restart
/// recovers both history and rolling summary. Safe under concurrent
/// threads within one process; concurrent processes are not supported.
pub struct SessionManager {
    dir: PathBuf,
    sessions: RwLock<HashMap<String, Session>>,
}

fn sanitize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

impl SessionManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// File backing a session. The sanitized slug keeps names readable;
    /// the sha256 suffix keeps distinct keys from colliding after
    /// sanitization.
    fn session_file(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let tag = format!("{:x}", digest);
        let slug = sanitize_slug(key);
        let name = if slug.is_empty() {
            format!("session-{}.json", &tag[..8])
        } else {
            format!("{}-{}.json", slug, &tag[..8])
        };
        self.dir.join(name)
    }

    fn load_from_disk(&self, key: &str) -> Option<Session> {
        let path = self.session_file(key);
        if !path.exists() {
            return None;
        }
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read session file");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "session file is corrupt; starting fresh");
                None
            }
        }
    }

    /// Flush failures are logged, not propagated: in-memory state stays
    /// authoritative for the life of the process.
    fn persist(&self, key: &str, session: &Session) {
        let path = self.session_file(key);
        if let Some(parent) = path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to create sessions dir");
                return;
            }
        }
        let data = match serde_json::to_string_pretty(session) {
            Ok(data) => data,
            Err(err) => {
                warn!(key, error = %err, "failed to encode session");
                return;
            }
        };
        if let Err(err) = fs::write(&path, format!("{data}\n")) {
            warn!(path = %path.display(), error = %err, "failed to write session file");
        }
    }

    fn with_session<R>(&self, key: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        if !sessions.contains_key(key) {
            let loaded = self.load_from_disk(key).unwrap_or_default();
            sessions.insert(key.to_string(), loaded);
        }
        let session = sessions.get_mut(key).expect("session just inserted");
        let out = f(session);
        self.persist(key, session);
        out
    }

    pub fn get_or_create(&self, key: &str) -> Session {
        self.with_session(key, |session| session.clone())
    }

    pub fn add_message(&self, key: &str, role: &str, content: &str) {
        self.with_session(key, |session| {
            session.history.push(ChatMessage::new(role, content));
        });
    }

    pub fn add_full_message(&self, key: &str, message: ChatMessage) {
        self.with_session(key, |session| session.history.push(message));
    }

    pub fn get_history(&self, key: &str) -> Vec<ChatMessage> {
        {
            let sessions = self.sessions.read().expect("session lock poisoned");
            if let Some(session) = sessions.get(key) {
                return session.history.clone();
            }
        }
        self.get_or_create(key).history
    }

    /// Remove the first `n` messages atomically.
    pub fn truncate_front(&self, key: &str, n: usize) {
        self.with_session(key, |session| {
            let n = n.min(session.history.len());
            session.history.drain(..n);
        });
    }

    pub fn get_rolling_summary(&self, key: &str) -> String {
        {
            let sessions = self.sessions.read().expect("session lock poisoned");
            if let Some(session) = sessions.get(key) {
                return session.rolling_summary.clone();
            }
        }
        self.get_or_create(key).rolling_summary
    }

    pub fn set_rolling_summary(&self, key: &str, summary: &str) {
        self.with_session(key, |session| {
            session.rolling_summary = summary.to_string();
        });
    }

    /// Append an entry to the rolling summary, separated from the
    /// previous entry by a single blank line.
    pub fn append_rolling_summary(&self, key: &str, entry: &str) {
        self.with_session(key, |session| {
            if session.rolling_summary.is_empty() {
                session.rolling_summary = entry.to_string();
            } else {
                session.rolling_summary.push_str("\n\n");
                session.rolling_summary.push_str(entry);
            }
        });
    }
}
