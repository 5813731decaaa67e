use serde::Serialize;

/// Structured return value from tool execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolResult {
    /// Content fed to the LLM for context. Set on every result.
    pub for_llm: String,

    /// Content relayed directly to the end user, if any.
    /// Ignored when `silent` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub for_user: Option<String>,

    /// Suppress any user-facing echo of this result.
    pub silent: bool,

    /// The tool execution failed; `for_llm` carries the error text so
    /// the model can read it and recover.
    pub is_error: bool,

    /// Do NOT persist this result to session history: it is injected
    /// into the current LLM call only. Retrieval tools set this so
    /// re-hydrated context cannot re-bloat the history the compression
    /// pipeline just drained.
    pub ephemeral: bool,
}

impl ToolResult {
    pub fn text(for_llm: impl Into<String>) -> Self {
        Self {
            for_llm: for_llm.into(),
            ..Self::default()
        }
    }

    pub fn silent(for_llm: impl Into<String>) -> Self {
        Self {
            silent: true,
            ..Self::text(for_llm)
        }
    }

    /// Ephemeral results are also silent: they exist for the current
    /// prompt build only.
    pub fn ephemeral(for_llm: impl Into<String>) -> Self {
        Self {
            silent: true,
            ephemeral: true,
            ..Self::text(for_llm)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(message)
        }
    }
}
