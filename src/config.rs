use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AimemConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub memory: MemoryConfig,
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkingConfig,
    pub summary: SummaryConfig,
    pub response: ResponseConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Reserved for a future connection pool; the store currently serializes
    /// writers on a single WAL connection.
    pub max_connections: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum chunk size in bytes produced by the chunker.
    pub chunk_size: usize,
    pub max_chunks_per_query: usize,
    /// Default TTL in seconds applied to stored chunks. 0 disables TTL.
    pub ttl_default_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub cache_size: usize,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub overlap_size: usize,
    pub min_chunk_size: usize,
    pub code_weight: f64,
    pub heading_weight: f64,
    pub link_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SummaryConfig {
    pub min_summary_length: usize,
    pub max_summary_length: usize,
    pub preserve_code: bool,
    pub preserve_links: bool,
    pub keyword_weight: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ResponseConfig {
    pub max_tokens: usize,
    pub enable_paging: bool,
    pub page_size: usize,
    pub truncate_content: bool,
}

impl Default for AimemConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            memory: MemoryConfig::default(),
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            summary: SummaryConfig::default(),
            response: ResponseConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "aimem".into(),
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_aimem_dir()
            .join("aimem.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            max_connections: 4,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            max_chunks_per_query: 20,
            ttl_default_secs: 0,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "hash-384".into(),
            cache_size: 1000,
            batch_size: 32,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            overlap_size: 0, // 0 = chunk_size / 10
            min_chunk_size: 50,
            code_weight: 0.2,
            heading_weight: 0.3,
            link_weight: 0.1,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            min_summary_length: 50,
            max_summary_length: 2000,
            preserve_code: true,
            preserve_links: true,
            keyword_weight: 1.5,
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_tokens: 20_000,
            enable_paging: true,
            page_size: 10,
            truncate_content: true,
        }
    }
}

/// Returns `~/.aimem/`
pub fn default_aimem_dir() -> PathBuf {
    dirs::home_dir()
        .expect("home directory must exist")
        .join(".aimem")
}

/// Returns the default config file path: `~/.aimem/config.yaml`
pub fn default_config_path() -> PathBuf {
    default_aimem_dir().join("config.yaml")
}

impl AimemConfig {
    /// Load config from the YAML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            serde_yaml::from_str(&contents).context("failed to parse config YAML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            AimemConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (AIMEM_DB, AIMEM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("AIMEM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("AIMEM_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Effective overlap size: configured value, or 10% of the chunk size.
    pub fn effective_overlap(&self) -> usize {
        if self.chunking.overlap_size > 0 {
            self.chunking.overlap_size
        } else {
            self.memory.chunk_size / 10
        }
    }

    /// Summary byte budget: a third of the chunk size, clamped to the
    /// configured min/max.
    pub fn summary_budget(&self) -> usize {
        (self.memory.chunk_size / 3)
            .max(self.summary.min_summary_length)
            .min(self.summary.max_summary_length)
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
