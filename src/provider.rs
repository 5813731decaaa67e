use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolSpec;

pub const ROLE_SYSTEM: &str = "system";
pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";
pub const ROLE_TOOL: &str = "tool";

/// A single conversation message. The memory subsystem only interprets
/// `role`; any additional fields a provider attaches (tool call ids,
/// names, ...) ride along in `extra` so archival stays lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ROLE_SYSTEM, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ROLE_USER, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ROLE_ASSISTANT, content)
    }

    pub fn is_dialogue(&self) -> bool {
        self.role == ROLE_USER || self.role == ROLE_ASSISTANT
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Generation knobs forwarded verbatim to the provider.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

/// The text-generation interface the memory subsystem depends on.
/// Concrete adapters (HTTP providers, local models) live in the host
/// application; this crate ships only scripted test doubles.
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        model: &str,
        opts: &ChatOptions,
    ) -> Result<ChatResponse>;

    fn default_model(&self) -> &str;
}

/// Cooperative cancellation flag shared between the host turn and
/// long-running provider calls. Checked by the compressor before the
/// summarization call and again before the commit sequence; a cancelled
/// compression leaves every piece of session state untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
