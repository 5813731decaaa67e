use crate::agent::cold_storage::ChunkRef;

/// Append the memory blocks to a base system prompt: the running
/// summary verbatim, then the retrievable chunk listing. Sessions with
/// no compressed history get the base prompt back unchanged.
pub fn with_memory_sections(base: &str, rolling_summary: &str, refs: &[ChunkRef]) -> String {
    if rolling_summary.is_empty() && refs.is_empty() {
        return base.to_string();
    }

    let mut out = String::from(base);
    out.push_str("\n\n## Memory\n");
    if !rolling_summary.is_empty() {
        out.push_str("**Running summary:**\n");
        out.push_str(rolling_summary);
        out.push('\n');
    }
    if !refs.is_empty() {
        out.push_str("\nArchived chunks (load with retrieve_chunk):\n");
        for chunk_ref in refs {
            out.push_str(&format!("{}: {}\n", chunk_ref.id, chunk_ref.summary));
        }
    }
    out
}
