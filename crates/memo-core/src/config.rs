//! Configuration management for memo.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (OPENAI_API_KEY, QDRANT_URL, MEMO_*)
//! 2. Config file ($MEMO_CONFIG or ~/.memo/config.toml)
//! 3. Default values
//!
//! The resulting value is immutable after startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::index::Distance;
use crate::types::ContentTopology;

/// Instruction sent ahead of every importance scoring request.
pub const DEFAULT_IMPORTANCE_PROMPT: &str = "On a scale of 1 to 10, where 1 is purely mundane \
(e.g. brushing teeth, making the bed) and 10 is extremely poignant (e.g. a break up, a college \
acceptance), rate the likely poignancy of each of the following memories. The memories are \
separated by ';'. Reply with one integer rating per memory, in the same order, separated by ', ' \
and nothing else.";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoConfig {
    /// Vector index settings
    #[serde(default)]
    pub vector: VectorConfig,

    /// Document store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding and completion provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Memory coordination settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Base URL of the Qdrant REST API
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// API key sent as `api-key`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Dimensionality of every embedding and every collection
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default)]
    pub distance: Distance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// OpenAI-compatible API base, including the version segment
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_completion_model")]
    pub completion_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Page size for listings and result count for searches
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Minimum similarity for search hits; `None` disables the filter
    #[serde(default = "default_score_threshold")]
    pub score_threshold: Option<f32>,

    #[serde(default)]
    pub topology: ContentTopology,

    /// Score importance of every ingested batch
    #[serde(default)]
    pub score_importance: bool,

    #[serde(default = "default_importance_prompt")]
    pub importance_prompt: String,

    /// Bound on each external call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

// Default value functions
fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memo")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("memo.db")
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_completion_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_limit() -> usize {
    5
}

fn default_score_threshold() -> Option<f32> {
    Some(0.6)
}

fn default_importance_prompt() -> String {
    DEFAULT_IMPORTANCE_PROMPT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            dimension: default_dimension(),
            distance: Distance::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_url(),
            api_key: None,
            embedding_model: default_embedding_model(),
            completion_model: default_completion_model(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            score_threshold: default_score_threshold(),
            topology: ContentTopology::default(),
            score_importance: false,
            importance_prompt: default_importance_prompt(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl MemoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl MemoConfig {
    /// Load configuration from the default path and the process environment.
    pub fn load() -> Result<Self, ConfigValidationError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path` (defaults if absent), then apply the
    /// process environment.
    pub fn load_from(path: &Path) -> Result<Self, ConfigValidationError> {
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigValidationError::Read {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigValidationError> {
        toml::from_str(content).map_err(|e| ConfigValidationError::Parse(e.to_string()))
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEMO_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(url) = lookup("QDRANT_URL") {
            self.vector.url = url;
        }
        if let Some(key) = lookup("QDRANT_API_KEY") {
            self.vector.api_key = Some(key);
        }
        if let Some(path) = lookup("MEMO_DATABASE_PATH") {
            self.store.database_path = PathBuf::from(path);
        }
        if let Some(bind) = lookup("MEMO_BIND") {
            self.server.bind = bind;
        }
    }

    /// Builder: set the content topology
    pub fn with_topology(mut self, topology: ContentTopology) -> Self {
        self.memory.topology = topology;
        self
    }

    /// Builder: set the default search threshold
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.memory.score_threshold = Some(threshold);
        self
    }

    /// Builder: return every hit regardless of similarity
    pub fn without_score_threshold(mut self) -> Self {
        self.memory.score_threshold = None;
        self
    }

    /// Builder: set the vector dimensionality
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.vector.dimension = dimension;
        self
    }

    /// Builder: set the provider API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.provider.api_key = Some(key.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.provider.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigValidationError::MissingApiKey);
        }

        if self.vector.dimension == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "vector.dimension".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.memory.default_limit == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.default_limit".into(),
                message: "must be greater than 0".into(),
            });
        }

        if let Some(threshold) = self.memory.score_threshold
            && !(-1.0..=1.0).contains(&threshold)
        {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.score_threshold".into(),
                message: "must be between -1 and 1".into(),
            });
        }

        if self.memory.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.memory.score_importance && self.memory.importance_prompt.trim().is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "memory.importance_prompt".into(),
                message: "must not be empty when importance scoring is enabled".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("provider.api_key is required (or set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("failed to read config file {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    #[error("failed to parse config file: {0}")]
    Parse(String),
}
