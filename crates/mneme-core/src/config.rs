//! Persisted config (memory directory, Ollama endpoint, chunking) in the app data directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::{ChunkError, Chunker, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::engine::EngineOptions;
use crate::ollama::{DEFAULT_BASE_URL, DEFAULT_EMBED_MODEL, DEFAULT_PLAN_MODEL};
use crate::types::DEFAULT_TOP_K;

const CONFIG_FILENAME: &str = "config.toml";
const MEMORY_DIRNAME: &str = "memory";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where the memory files live. Defaults to `<app data>/memory`.
    pub memory_dir: Option<String>,
    pub ollama_url: String,
    pub embed_model: String,
    pub plan_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_dir: None,
            ollama_url: DEFAULT_BASE_URL.to_string(),
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            plan_model: DEFAULT_PLAN_MODEL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embed_timeout_secs: 30,
            fetch_timeout_secs: 10,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    /// Fails fast on settings that can never work (e.g. overlap >= chunk size).
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunker()?;
        if self.embed_timeout_secs == 0 {
            return Err(ConfigError::Invalid("embed_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn chunker(&self) -> Result<Chunker, ConfigError> {
        Chunker::new(self.chunk_size, self.chunk_overlap).map_err(ConfigError::Chunking)
    }

    pub fn engine_options(&self) -> Result<EngineOptions, ConfigError> {
        self.validate()?;
        Ok(EngineOptions {
            chunker: self.chunker()?,
            embed_timeout: Duration::from_secs(self.embed_timeout_secs),
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The configured memory directory, or the default under app data.
    pub fn resolved_memory_dir(&self) -> Option<PathBuf> {
        match self.memory_dir.as_deref().filter(|s| !s.is_empty()) {
            Some(dir) => Some(PathBuf::from(dir)),
            None => app_data::app_data_dir().map(|d| d.join(MEMORY_DIRNAME)),
        }
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    load_config_from(&data_dir.join(CONFIG_FILENAME))
}

pub fn load_config_from(path: &Path) -> Config {
    let Ok(s) = std::fs::read_to_string(path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        Config::default()
    })
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    save_config_to(config, &data_dir.join(CONFIG_FILENAME))
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

/// Set and persist the memory directory, creating it if needed.
pub fn set_memory_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(ConfigError::Write)?;
    let path = path.canonicalize().map_err(ConfigError::Canonicalize)?;
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(path));
    }
    let mut config = load_config();
    config.memory_dir = Some(path.to_string_lossy().into_owned());
    save_config(&config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("invalid chunking: {0}")]
    Chunking(ChunkError),
    #[error("invalid config: {0}")]
    Invalid(String),
}
