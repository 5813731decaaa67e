use anyhow::Result;

use crate::agent::ColdStorage;
use crate::commands::CommandReport;
use crate::config::Config;

pub fn run(cfg: &Config) -> Result<CommandReport> {
    let mut report = CommandReport::new("status");

    let cold_dir = cfg.workspace.join(&cfg.compression.cold_storage_dir);
    let sessions_dir = cfg.workspace.join("sessions");

    report.detail(format!("workspace={}", cfg.workspace.display()));
    report.detail(format!("cold_storage_dir={}", cold_dir.display()));
    report.detail(format!("sessions_dir={}", sessions_dir.display()));
    report.detail(format!(
        "chunk_size_tokens={} min_chunk_messages={} continuity_buffer={}",
        cfg.compression.chunk_size_tokens,
        cfg.compression.min_chunk_messages,
        cfg.compression.continuity_buffer
    ));

    if !cold_dir.exists() {
        report.detail("cold storage not initialized yet (no chunks archived)");
        return Ok(report);
    }

    let storage = ColdStorage::new(&cold_dir)?;
    let counts = storage.session_ref_counts();
    let total: usize = counts.iter().map(|(_, n)| n).sum();
    report.detail(format!("sessions_with_chunks={}", counts.len()));
    report.detail(format!("chunks_total={total}"));
    for (session_key, count) in counts {
        report.detail(format!("session {session_key}: {count} chunk(s)"));
    }

    Ok(report)
}
