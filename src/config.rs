use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Knobs for the history compression pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Estimated-token threshold above which compression runs.
    pub chunk_size_tokens: usize,
    /// Smallest prefix eligible for archival.
    pub min_chunk_messages: usize,
    /// Trailing messages never archived in a single pass.
    pub continuity_buffer: usize,
    /// Archive directory, relative to the agent workspace.
    pub cold_storage_dir: String,
    /// Model used for summarization; empty means the provider default.
    pub summary_model: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 8000,
            min_chunk_messages: 8,
            continuity_buffer: 4,
            cold_storage_dir: "cold_storage".to_string(),
            summary_model: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace: PathBuf,
    /// Model for user-facing turns; empty means the provider default.
    pub model: String,
    pub base_prompt: String,
    pub compression: CompressionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            model: String::new(),
            base_prompt: "You are a helpful assistant.".to_string(),
            compression: CompressionConfig::default(),
        }
    }
}

fn default_workspace() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".loam").join("workspace"),
        None => PathBuf::from(".loam/workspace"),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartialConfig {
    workspace: Option<PathBuf>,
    model: Option<String>,
    base_prompt: Option<String>,
    compression: Option<CompressionConfig>,
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: String) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback,
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("LOAM_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".loam").join("loam.toml"))
}

fn merge_toml(base: &mut Config, raw: &str, origin: &Path) -> Result<()> {
    let parsed: PartialConfig = toml::from_str(raw)
        .map_err(|err| anyhow!("failed to parse config {}: {err}", origin.display()))?;
    if let Some(workspace) = parsed.workspace {
        base.workspace = workspace;
    }
    if let Some(model) = parsed.model {
        base.model = model;
    }
    if let Some(base_prompt) = parsed.base_prompt {
        base.base_prompt = base_prompt;
    }
    if let Some(compression) = parsed.compression {
        base.compression = compression;
    }
    Ok(())
}

fn merge_file_config(base: &mut Config) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw, &path)
}

fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(workspace) = env::var("LOAM_WORKSPACE") {
        let trimmed = workspace.trim();
        if !trimmed.is_empty() {
            cfg.workspace = PathBuf::from(trimmed);
        }
    }
    cfg.model = env_or_string("LOAM_MODEL", cfg.model.clone());
    cfg.compression.chunk_size_tokens = env_or_usize(
        "LOAM_CHUNK_SIZE_TOKENS",
        cfg.compression.chunk_size_tokens,
    );
    cfg.compression.min_chunk_messages = env_or_usize(
        "LOAM_MIN_CHUNK_MESSAGES",
        cfg.compression.min_chunk_messages,
    );
    cfg.compression.continuity_buffer = env_or_usize(
        "LOAM_CONTINUITY_BUFFER",
        cfg.compression.continuity_buffer,
    );
    cfg.compression.cold_storage_dir = env_or_string(
        "LOAM_COLD_STORAGE_DIR",
        cfg.compression.cold_storage_dir.clone(),
    );
    cfg.compression.summary_model = env_or_string(
        "LOAM_SUMMARY_MODEL",
        cfg.compression.summary_model.clone(),
    );
}

pub fn validate(cfg: &Config) -> Result<()> {
    if cfg.compression.chunk_size_tokens == 0 {
        return Err(anyhow!("invalid chunk_size_tokens: must be >= 1"));
    }
    if cfg.compression.min_chunk_messages == 0 {
        return Err(anyhow!("invalid min_chunk_messages: must be >= 1"));
    }
    let dir = cfg.compression.cold_storage_dir.trim();
    if dir.is_empty() {
        return Err(anyhow!("cold_storage_dir cannot be empty"));
    }
    if Path::new(dir).is_absolute() {
        return Err(anyhow!(
            "cold_storage_dir must be relative to the workspace: {dir}"
        ));
    }
    Ok(())
}

/// Defaults, then the optional TOML file, then `LOAM_*` env overrides.
pub fn load_config() -> Result<Config> {
    let mut cfg = Config::default();
    merge_file_config(&mut cfg)?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
