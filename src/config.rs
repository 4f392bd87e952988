use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::engine::EngineOptions;
use crate::retrieval;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub log_level: String,
    pub storage: StorageSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    pub base_dir: String,
    pub instance: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_context_items: usize,
    pub max_context_tokens: usize,
    pub max_results: usize,
    pub min_score: f64,
    pub recency_boost: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".into(),
            storage: StorageSettings::default(),
            retrieval: RetrievalSettings::default(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let base_dir = default_memory_dir().to_string_lossy().into_owned();
        Self {
            base_dir,
            instance: "default".into(),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_context_items: retrieval::DEFAULT_MAX_RESULTS,
            max_context_tokens: retrieval::DEFAULT_MAX_CONTEXT_TOKENS,
            max_results: 10,
            min_score: retrieval::DEFAULT_MIN_SCORE,
            recency_boost: retrieval::DEFAULT_RECENCY_BOOST,
        }
    }
}

/// Returns `~/.hindsight/`
pub fn default_memory_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".hindsight")
}

/// Returns the default config file path: `~/.hindsight/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memory_dir().join("config.toml")
}

impl MemoryConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MemoryConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (HINDSIGHT_BASE, HINDSIGHT_INSTANCE,
    /// HINDSIGHT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HINDSIGHT_BASE") {
            self.storage.base_dir = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_INSTANCE") {
            self.storage.instance = val;
        }
        if let Ok(val) = std::env::var("HINDSIGHT_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Resolve the storage base directory, expanding `~` if needed.
    pub fn resolved_base_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.base_dir)
    }

    /// Engine knobs derived from the retrieval section.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            enabled: self.enabled,
            max_context_items: self.retrieval.max_context_items,
            max_context_tokens: self.retrieval.max_context_tokens,
            min_score: self.retrieval.min_score,
            recency_boost: self.retrieval.recency_boost,
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .expect("home directory must exist")
            .join(rest)
    } else {
        PathBuf::from(path)
    }
}
