use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub llm: Option<LlmConfig>,
    pub cache: Option<CacheConfig>,
    pub extraction: Option<ExtractionConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub path: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub workers: Option<usize>,
}

/// Platform config directory path: `<config_dir>/advocate/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("advocate").join("config.toml"))
}

/// Platform cache database path: `<cache_dir>/advocate/results.db`.
pub fn default_cache_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("advocate").join("results.db"))
}

/// Load config by cascading CWD `.advocate.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".advocate.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed; a parse failure is logged so a typo in the
/// file doesn't silently revert everything to defaults.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse config file");
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        llm: Some(LlmConfig {
            base_url: overlay
                .llm
                .as_ref()
                .and_then(|l| l.base_url.clone())
                .or_else(|| base.llm.as_ref().and_then(|l| l.base_url.clone())),
            model: overlay
                .llm
                .as_ref()
                .and_then(|l| l.model.clone())
                .or_else(|| base.llm.as_ref().and_then(|l| l.model.clone())),
            timeout_secs: overlay
                .llm
                .as_ref()
                .and_then(|l| l.timeout_secs)
                .or_else(|| base.llm.as_ref().and_then(|l| l.timeout_secs)),
            max_tokens: overlay
                .llm
                .as_ref()
                .and_then(|l| l.max_tokens)
                .or_else(|| base.llm.as_ref().and_then(|l| l.max_tokens)),
        }),
        cache: Some(CacheConfig {
            path: overlay
                .cache
                .as_ref()
                .and_then(|c| c.path.clone())
                .or_else(|| base.cache.as_ref().and_then(|c| c.path.clone())),
            enabled: overlay
                .cache
                .as_ref()
                .and_then(|c| c.enabled)
                .or_else(|| base.cache.as_ref().and_then(|c| c.enabled)),
        }),
        extraction: Some(ExtractionConfig {
            workers: overlay
                .extraction
                .as_ref()
                .and_then(|e| e.workers)
                .or_else(|| base.extraction.as_ref().and_then(|e| e.workers)),
        }),
    }
}

/// Save the current config to the platform config directory.
pub fn save_config(config: &ConfigFile) -> Result<PathBuf, String> {
    let path = config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}
