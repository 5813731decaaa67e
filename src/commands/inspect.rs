use anyhow::Result;

use crate::agent::{format_chunk_transcript, ColdStorage};
use crate::commands::CommandReport;
use crate::config::Config;
use crate::error::MemoryError;

pub fn run(cfg: &Config, chunk_id: &str) -> Result<CommandReport> {
    let mut report = CommandReport::new("inspect");

    let cold_dir = cfg.workspace.join(&cfg.compression.cold_storage_dir);
    if !cold_dir.exists() {
        report.issue(format!(
            "{} (expected at {})",
            MemoryError::NotConfigured,
            cold_dir.display()
        ));
        return Ok(report);
    }

    let storage = ColdStorage::new(&cold_dir)?;
    match storage.load_chunk(chunk_id.trim()) {
        Ok(record) => {
            report.detail(format!(
                "session_key={} msg_range=[{}, {})",
                record.session_key, record.msg_range[0], record.msg_range[1]
            ));
            if !record.summary.is_empty() {
                report.detail(format!("summary: {}", record.summary));
            }
            report.detail(format_chunk_transcript(&record));
        }
        Err(err) => report.issue(err.to_string()),
    }

    Ok(report)
}
