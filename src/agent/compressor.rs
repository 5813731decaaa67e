use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use tracing::{debug, info, warn};

use crate::agent::cold_storage::{ChunkRecord, ColdStorage};
use crate::config::CompressionConfig;
use crate::error::MemoryError;
use crate::provider::{CancelToken, ChatMessage, ChatOptions, ChatProvider};
use crate::session::SessionManager;

/// Fixed instruction for the summarization call. The input is the raw
/// user/assistant dialogue only; prior summaries are never fed back in,
/// so the rolling summary cannot drift away from what was actually said.
const SUMMARIZER_INSTRUCTION: &str = "You are a conversation summarizer. Produce a terse, \
factual summary of the dialogue below: topics, decisions, and outcomes. \
Plain text, no preamble.";

/// Attempts at allocating a non-colliding chunk ID before giving up.
const MAX_ID_ATTEMPTS: usize = 4;

#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub chunk_id: String,
    pub archived_messages: usize,
}

/// Rough token estimate: total content characters divided by four.
/// Only gates when compression fires; correctness never depends on it.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    let chars: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    chars / 4
}

fn summarization_input(prefix: &[ChatMessage]) -> String {
    let mut out = String::new();
    for msg in prefix.iter().filter(|m| m.is_dialogue()) {
        out.push_str(&format!("{}: {}\n\n", msg.role, msg.content));
    }
    out
}

fn rolling_summary_entry(summary: &str) -> String {
    let stamp = Local::now().format("%Y-%m-%d %H:%M");
    if summary.is_empty() {
        format!("[{stamp}]")
    } else {
        format!("[{stamp}]\n{summary}")
    }
}

/// Run one compression pass over a session if the history is over the
/// token threshold.
///
/// On success the commit sequence is: archive the chunk (the rename is
/// the durable commit point), append the index ref, append the dated
/// rolling-summary entry, truncate the archived prefix from history.
/// Any failure before the archive write leaves every piece of state
/// exactly as it was; the caller decides whether errors are fatal (the
/// turn loop logs them at WARN and moves on).
pub fn compress_session(
    sessions: &SessionManager,
    storage: Option<&ColdStorage>,
    provider: &dyn ChatProvider,
    cfg: &CompressionConfig,
    session_key: &str,
    cancel: &CancelToken,
) -> Result<Option<CompressionOutcome>> {
    let Some(storage) = storage else {
        debug!(session_key, "cold storage not configured; skipping compression");
        return Ok(None);
    };

    let history = sessions.get_history(session_key);
    if estimate_tokens(&history) <= cfg.chunk_size_tokens {
        return Ok(None);
    }
    if history.len() < cfg.min_chunk_messages + cfg.continuity_buffer {
        debug!(
            session_key,
            messages = history.len(),
            "history too short to compress"
        );
        return Ok(None);
    }

    let end = history.len() - cfg.continuity_buffer;
    let prefix = &history[..end];

    if cancel.is_cancelled() {
        bail!("compression cancelled before summarization");
    }

    let input = vec![
        ChatMessage::system(SUMMARIZER_INSTRUCTION),
        ChatMessage::user(summarization_input(prefix)),
    ];
    let model = if cfg.summary_model.is_empty() {
        provider.default_model().to_string()
    } else {
        cfg.summary_model.clone()
    };
    let response = provider
        .chat(&input, &[], &model, &ChatOptions::default())
        .context("summarization provider call failed")?;

    if cancel.is_cancelled() {
        bail!("compression cancelled; discarding summarization result");
    }

    // An empty summary is still archived: the chunk is the source of
    // truth, the summary only a projection of it.
    let summary = response.content;

    let mut chunk_id = None;
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = storage.next_chunk_id(session_key);
        let record = ChunkRecord {
            id: id.clone(),
            session_key: session_key.to_string(),
            msg_range: [0, end],
            created_at: Utc::now(),
            summary: summary.clone(),
            messages: prefix.to_vec(),
        };
        match storage.save_chunk(&record) {
            Ok(()) => {
                chunk_id = Some(id);
                break;
            }
            Err(MemoryError::ChunkExists(id)) => {
                warn!(id = %id, "chunk id collision; retrying with a fresh id");
            }
            Err(err) => return Err(err).context("failed to archive chunk"),
        }
    }
    let Some(chunk_id) = chunk_id else {
        bail!("could not allocate a unique chunk id after {MAX_ID_ATTEMPTS} attempts");
    };

    sessions.append_rolling_summary(session_key, &rolling_summary_entry(&summary));
    sessions.truncate_front(session_key, end);

    info!(
        session_key,
        chunk_id = %chunk_id,
        archived = end,
        "compressed history prefix into cold storage"
    );
    Ok(Some(CompressionOutcome {
        chunk_id,
        archived_messages: end,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct ScriptedProvider {
        summary: String,
        fail: bool,
        cancel_during_call: Option<CancelToken>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn returning(summary: &str) -> Self {
            Self {
                summary: summary.to_string(),
                fail: false,
                cancel_during_call: None,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            let mut provider = Self::returning("");
            provider.fail = true;
            provider
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ChatProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn chat(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolSpec],
            _model: &str,
            _opts: &ChatOptions,
        ) -> Result<crate::provider::ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .expect("seen lock")
                .push(messages.to_vec());
            if let Some(token) = &self.cancel_during_call {
                token.cancel();
            }
            if self.fail {
                bail!("provider unavailable");
            }
            Ok(crate::provider::ChatResponse {
                content: self.summary.clone(),
                tool_calls: Vec::new(),
            })
        }

        fn default_model(&self) -> &str {
            "scripted-small"
        }
    }

    fn tight_config() -> CompressionConfig {
        CompressionConfig {
            chunk_size_tokens: 1,
            min_chunk_messages: 2,
            continuity_buffer: 1,
            ..CompressionConfig::default()
        }
    }

    fn seed(sessions: &SessionManager, key: &str, turns: &[(&str, &str)]) {
        for (role, content) in turns {
            sessions.add_message(key, role, content);
        }
    }

    #[test]
    fn below_threshold_is_a_no_op() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("unused");
        let cfg = CompressionConfig {
            chunk_size_tokens: 1_000_000,
            ..tight_config()
        };

        seed(&sessions, "k", &[("user", "hi"), ("assistant", "hello"), ("user", "more")]);
        let out = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &cfg,
            "k",
            &CancelToken::new(),
        )
        .expect("compress");

        assert!(out.is_none());
        assert_eq!(provider.calls(), 0);
        assert_eq!(sessions.get_history("k").len(), 3);
    }

    #[test]
    fn short_history_is_a_no_op_even_under_pressure() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("unused");
        let cfg = CompressionConfig {
            min_chunk_messages: 3,
            continuity_buffer: 2,
            ..tight_config()
        };

        // 4 messages < min(3) + buffer(2).
        seed(
            &sessions,
            "k",
            &[
                ("user", "aaaa"),
                ("assistant", "bbbb"),
                ("user", "cccc"),
                ("assistant", "dddd"),
            ],
        );
        let out = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &cfg,
            "k",
            &CancelToken::new(),
        )
        .expect("compress");

        assert!(out.is_none());
        assert_eq!(provider.calls(), 0);
        assert_eq!(sessions.get_history("k").len(), 4);
        assert!(sessions.get_rolling_summary("k").is_empty());
    }

    #[test]
    fn empty_session_is_a_no_op() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("unused");

        let out = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &tight_config(),
            "empty",
            &CancelToken::new(),
        )
        .expect("compress");

        assert!(out.is_none());
        assert_eq!(provider.calls(), 0);
    }

    #[test]
    fn compresses_widest_prefix_and_truncates() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("they talked about weather");

        let key = "agent:main:alice";
        seed(
            &sessions,
            key,
            &[
                ("user", "What's the weather?"),
                ("assistant", "Sunny."),
                ("tool", "lookup result"),
                ("user", "And tomorrow?"),
                ("assistant", "Rain."),
            ],
        );

        let out = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &tight_config(),
            key,
            &CancelToken::new(),
        )
        .expect("compress")
        .expect("should have compressed");

        assert_eq!(out.archived_messages, 4);

        // Continuity buffer: the last message stays live.
        let history = sessions.get_history(key);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "Rain.");

        // The archived chunk holds the removed prefix verbatim, tool
        // message included.
        let record = storage.load_chunk(&out.chunk_id).expect("load");
        assert_eq!(record.msg_range, [0, 4]);
        assert_eq!(record.messages.len(), 4);
        assert_eq!(record.messages[2].role, "tool");
        assert_eq!(record.summary, "they talked about weather");

        // Index and rolling summary both carry exactly one entry.
        let refs = storage.list_refs(key);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].id, out.chunk_id);
        let summary = sessions.get_rolling_summary(key);
        let mut lines = summary.lines();
        let stamp = lines.next().expect("timestamp line");
        assert!(
            stamp.starts_with('[') && stamp.ends_with(']'),
            "entry should start with a [YYYY-MM-DD HH:MM] stamp: {stamp}"
        );
        assert_eq!(lines.next(), Some("they talked about weather"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn summarization_input_is_dialogue_only() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("ok");

        let key = "k";
        seed(
            &sessions,
            key,
            &[
                ("system", "You are a helpful assistant"),
                ("user", "Hello"),
                ("assistant", "Hi there!"),
                ("tool", "secret tool payload"),
                ("user", "How are you?"),
            ],
        );

        compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &tight_config(),
            key,
            &CancelToken::new(),
        )
        .expect("compress")
        .expect("compressed");

        let seen = provider.seen.lock().expect("seen lock");
        assert_eq!(seen.len(), 1);
        let input = &seen[0];
        assert_eq!(input.len(), 2);
        assert_eq!(input[0].role, "system");
        assert_eq!(input[1].role, "user");
        assert!(input[1].content.contains("user: Hello"));
        assert!(input[1].content.contains("assistant: Hi there!"));
        assert!(!input[1].content.contains("You are a helpful assistant"));
        assert!(!input[1].content.contains("secret tool payload"));
    }

    #[test]
    fn provider_failure_leaves_state_untouched() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::failing();

        let key = "k";
        seed(
            &sessions,
            key,
            &[("user", "one"), ("assistant", "two"), ("user", "three")],
        );
        let before = sessions.get_history(key);

        let err = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &tight_config(),
            key,
            &CancelToken::new(),
        )
        .expect_err("provider failure must propagate");
        assert!(format!("{err:#}").contains("provider unavailable"));

        assert_eq!(sessions.get_history(key), before);
        assert!(sessions.get_rolling_summary(key).is_empty());
        assert!(storage.list_refs(key).is_empty());
    }

    #[test]
    fn cancellation_discards_the_result() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");

        let key = "k";
        seed(
            &sessions,
            key,
            &[("user", "one"), ("assistant", "two"), ("user", "three")],
        );
        let before = sessions.get_history(key);

        // Cancelled before the call: the provider is never invoked.
        let cancel = CancelToken::new();
        cancel.cancel();
        let provider = ScriptedProvider::returning("late");
        compress_session(&sessions, Some(&storage), &provider, &tight_config(), key, &cancel)
            .expect_err("cancelled compression must error");
        assert_eq!(provider.calls(), 0);

        // Cancelled during the call: the result is discarded unused.
        let cancel = CancelToken::new();
        let mut provider = ScriptedProvider::returning("late");
        provider.cancel_during_call = Some(cancel.clone());
        compress_session(&sessions, Some(&storage), &provider, &tight_config(), key, &cancel)
            .expect_err("cancelled compression must error");

        assert_eq!(sessions.get_history(key), before);
        assert!(sessions.get_rolling_summary(key).is_empty());
        assert!(storage.list_refs(key).is_empty());
    }

    #[test]
    fn unconfigured_storage_is_inert() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let provider = ScriptedProvider::returning("unused");

        let key = "k";
        seed(
            &sessions,
            key,
            &[("user", "one"), ("assistant", "two"), ("user", "three")],
        );

        let out = compress_session(
            &sessions,
            None,
            &provider,
            &tight_config(),
            key,
            &CancelToken::new(),
        )
        .expect("compress");

        assert!(out.is_none());
        assert_eq!(provider.calls(), 0);
        assert_eq!(sessions.get_history(key).len(), 3);
        assert!(sessions.get_rolling_summary(key).is_empty());
    }

    #[test]
    fn empty_summary_still_archives() {
        let tmp = tempdir().expect("tempdir");
        let sessions = SessionManager::new(tmp.path().join("sessions"));
        let storage = ColdStorage::new(tmp.path().join("cold")).expect("storage");
        let provider = ScriptedProvider::returning("");

        let key = "k";
        seed(
            &sessions,
            key,
            &[("user", "one"), ("assistant", "two"), ("user", "three")],
        );

        let out = compress_session(
            &sessions,
            Some(&storage),
            &provider,
            &tight_config(),
            key,
            &CancelToken::new(),
        )
        .expect("compress")
        .expect("compressed");

        assert_eq!(storage.list_refs(key).len(), 1);
        let record = storage.load_chunk(&out.chunk_id).expect("load");
        assert!(record.summary.is_empty());

        // The rolling-summary entry is the timestamp line alone.
        let summary = sessions.get_rolling_summary(key);
        assert_eq!(summary.lines().count(), 1);
        let line = summary.lines().next().expect("line");
        assert!(line.starts_with('[') && line.ends_with(']'));
    }
}
