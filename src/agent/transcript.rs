use crate::agent::cold_storage::ChunkRecord;

/// Render an archived chunk as a readable transcript for the model:
/// a dated header, then one `role: content` paragraph per message.
pub fn format_chunk_transcript(record: &ChunkRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "[Archived chunk {} — {}]\n\n",
        record.id,
        record.created_at.format("%Y-%m-%d %H:%M")
    ));
    for msg in &record.messages {
        out.push_str(&format!("{}: {}\n\n", msg.role, msg.content));
    }
    out
}
