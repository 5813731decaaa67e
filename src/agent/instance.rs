use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use crate::agent::cold_storage::ColdStorage;
use crate::agent::compressor::compress_session;
use crate::agent::prompt::with_memory_sections;
use crate::agent::transcript::format_chunk_transcript;
use crate::config::{CompressionConfig, Config};
use crate::provider::{CancelToken, ChatMessage, ChatOptions, ChatProvider, ROLE_ASSISTANT, ROLE_USER};
use crate::session::SessionManager;
use crate::tools::{RetrieveChunkTool, ToolRegistry};

/// One fully wired agent: provider, per-session state, tool registry,
/// and the optional cold-storage archive, all scoped to a workspace.
pub struct AgentInstance {
    pub model: String,
    pub base_prompt: String,
    pub workspace: PathBuf,
    pub provider: Arc<dyn ChatProvider>,
    pub sessions: SessionManager,
    pub tools: ToolRegistry,
    pub cold_storage: Option<Arc<ColdStorage>>,
    pub compression: CompressionConfig,
}

impl AgentInstance {
    /// Wire an agent from config. A cold-storage directory that cannot
    /// be opened is non-fatal: the agent runs without archiving (and
    /// without the retrieve tool), exactly as if it were unconfigured.
    pub fn new(cfg: &Config, provider: Arc<dyn ChatProvider>) -> Result<Self> {
        fs::create_dir_all(&cfg.workspace)
            .with_context(|| format!("failed to create workspace {}", cfg.workspace.display()))?;

        let cold_dir = cfg.workspace.join(&cfg.compression.cold_storage_dir);
        let cold_storage = match ColdStorage::new(&cold_dir) {
            Ok(storage) => Some(Arc::new(storage)),
            Err(err) => {
                warn!(
                    dir = %cold_dir.display(),
                    error = %format!("{err:#}"),
                    "cold storage unavailable; running without archiving"
                );
                None
            }
        };

        let mut tools = ToolRegistry::new();
        if let Some(storage) = &cold_storage {
            let storage = Arc::clone(storage);
            tools.register(Box::new(RetrieveChunkTool::new(Box::new(move |id| {
                let record = storage.load_chunk(id)?;
                Ok(format_chunk_transcript(&record))
            }))));
        }

        Ok(Self {
            model: cfg.model.clone(),
            base_prompt: cfg.base_prompt.clone(),
            workspace: cfg.workspace.clone(),
            provider,
            sessions: SessionManager::new(cfg.workspace.join("sessions")),
            tools,
            cold_storage,
            compression: cfg.compression.clone(),
        })
    }

    fn resolve_model(&self) -> String {
        if self.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            self.model.clone()
        }
    }

    /// Handle one inbound message: append it, answer it, then give the
    /// compression policy a chance to drain old history before the next
    /// turn. Compression failures are logged and swallowed — memory
    /// bookkeeping must never break the user's conversation.
    pub fn process_message(
        &self,
        session_key: &str,
        content: &str,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.sessions.add_message(session_key, ROLE_USER, content);

        let rolling_summary = self.sessions.get_rolling_summary(session_key);
        let refs = self
            .cold_storage
            .as_ref()
            .map(|storage| storage.list_refs(session_key))
            .unwrap_or_default();
        let system = with_memory_sections(&self.base_prompt, &rolling_summary, &refs);

        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(self.sessions.get_history(session_key));

        let response = self
            .provider
            .chat(
                &messages,
                &self.tools.specs(),
                &self.resolve_model(),
                &ChatOptions::default(),
            )
            .context("turn provider call failed")?;

        self.sessions
            .add_message(session_key, ROLE_ASSISTANT, &response.content);

        if let Err(err) = compress_session(
            &self.sessions,
            self.cold_storage.as_deref(),
            self.provider.as_ref(),
            &self.compression,
            session_key,
            cancel,
        ) {
            warn!(
                session_key,
                error = %format!("{err:#}"),
                "history compression failed; conversation continues uncompressed"
            );
        }

        Ok(response.content)
    }
}
