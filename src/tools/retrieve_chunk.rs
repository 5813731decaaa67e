use serde_json::{json, Value};

use crate::error::MemoryError;
use crate::tools::{Tool, ToolResult};

/// Retrieval function injected at registration time so the tool layer
/// never depends on the archive directly: `chunk id -> rendered
/// transcript`.
pub type RetrieveFn = Box<dyn Fn(&str) -> Result<String, MemoryError> + Send + Sync>;

/// Loads a previously archived conversation chunk by ID. Results are
/// ephemeral: fed to the current LLM call, never written back to
/// session history.
pub struct RetrieveChunkTool {
    retrieve: RetrieveFn,
}

impl RetrieveChunkTool {
    pub fn new(retrieve: RetrieveFn) -> Self {
        Self { retrieve }
    }
}

impl Tool for RetrieveChunkTool {
    fn name(&self) -> &'static str {
        "retrieve_chunk"
    }

    fn description(&self) -> &'static str {
        "Load the full archived messages for a past conversation chunk by its ID. \
         Valid IDs are the ones listed in the Memory section of the system prompt."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "chunk_id": {
                    "type": "string",
                    "description": "8-character hex chunk ID (e.g. a3f72b1c)"
                }
            },
            "required": ["chunk_id"]
        })
    }

    fn execute(&self, args: &Value) -> ToolResult {
        let chunk_id = args
            .get("chunk_id")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();
        if chunk_id.is_empty() {
            return ToolResult::error("chunk_id is required");
        }

        match (self.retrieve)(chunk_id) {
            Ok(transcript) => ToolResult::ephemeral(transcript),
            Err(err) => ToolResult::error(format!("chunk {chunk_id} unavailable: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::cold_storage::{ChunkRecord, ColdStorage};
    use crate::agent::transcript::format_chunk_transcript;
    use crate::provider::ChatMessage;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn storage_backed_tool(storage: Arc<ColdStorage>) -> RetrieveChunkTool {
        RetrieveChunkTool::new(Box::new(move |id| {
            let record = storage.load_chunk(id)?;
            Ok(format_chunk_transcript(&record))
        }))
    }

    #[test]
    fn retrieval_is_ephemeral_and_silent() {
        let tmp = tempdir().expect("tempdir");
        let storage = Arc::new(ColdStorage::new(tmp.path()).expect("storage"));

        let record = ChunkRecord {
            id: "abc12345".to_string(),
            session_key: "session1".to_string(),
            msg_range: [0, 2],
            created_at: Utc::now(),
            summary: "Test summary".to_string(),
            messages: vec![
                ChatMessage::user("Hello"),
                ChatMessage::assistant("Hi there"),
            ],
        };
        storage.save_chunk(&record).expect("save");

        let tool = storage_backed_tool(storage);
        let result = tool.execute(&json!({"chunk_id": "abc12345"}));

        assert!(!result.is_error);
        assert!(result.for_llm.contains("Hello"));
        assert!(result.for_llm.contains("Hi there"));
        assert!(result.ephemeral, "retrieved chunks must not persist to history");
        assert!(result.silent, "retrieved chunks are not echoed to the user");
    }

    #[test]
    fn missing_argument_is_an_error() {
        let tool = RetrieveChunkTool::new(Box::new(|_| Ok(String::new())));

        let result = tool.execute(&json!({}));
        assert!(result.is_error);
        assert_eq!(result.for_llm, "chunk_id is required");

        let result = tool.execute(&json!({"chunk_id": "   "}));
        assert!(result.is_error);
    }

    #[test]
    fn unknown_chunk_names_the_id() {
        let tmp = tempdir().expect("tempdir");
        let storage = Arc::new(ColdStorage::new(tmp.path()).expect("storage"));
        let tool = storage_backed_tool(storage);

        let result = tool.execute(&json!({"chunk_id": "feedbeef"}));
        assert!(result.is_error);
        assert!(result.for_llm.contains("feedbeef"));
        assert!(!result.ephemeral);
    }

    #[test]
    fn id_is_trimmed_before_lookup() {
        let tool = RetrieveChunkTool::new(Box::new(|id| {
            assert_eq!(id, "abc12345");
            Ok("transcript".to_string())
        }));

        let result = tool.execute(&json!({"chunk_id": "  abc12345  "}));
        assert!(!result.is_error);
        assert_eq!(result.for_llm, "transcript");
    }
}
