use std::fs;

use anyhow::{Context, Result};

use crate::agent::cold_storage::CHUNK_FILE_SUFFIX;
use crate::agent::ColdStorage;
use crate::commands::CommandReport;
use crate::config::Config;

/// Walk the storage directory the way the index rebuild does and
/// report every chunk file that would be skipped.
pub fn run(cfg: &Config) -> Result<CommandReport> {
    let mut report = CommandReport::new("verify");

    let cold_dir = cfg.workspace.join(&cfg.compression.cold_storage_dir);
    if !cold_dir.exists() {
        report.detail("cold storage not initialized yet; nothing to verify");
        return Ok(report);
    }

    let storage = ColdStorage::new(&cold_dir)?;
    let mut readable = 0usize;
    let entries = fs::read_dir(&cold_dir)
        .with_context(|| format!("failed to read {}", cold_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(id) = name.strip_suffix(CHUNK_FILE_SUFFIX) else {
            continue;
        };

        match storage.load_chunk(id) {
            Ok(_) => readable += 1,
            Err(err) => report.issue(format!("{name}: {err}")),
        }
    }

    report.detail(format!("chunks_readable={readable}"));
    Ok(report)
}
