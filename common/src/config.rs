//! System configuration for the Cellar data store.
//!
//! The configuration is split into `[logger]`, `[storage]` and `[server]`
//! TOML sections. Every field has a default so a config file only needs to
//! override what it cares about.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to create system directory {path}: {source}")]
    Directory {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub logger: LoggerConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub logs_directory_path: PathBuf,
    pub component_name: String,
    pub queue_size_bytes: usize,
    pub max_log_file_size_bytes: u64,
    pub max_number_files_for_session: u32,
    pub flush_frequency_ms: u64,
    pub log_file_prefix: String,
    pub logging_session_directory_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub kv_store_path: PathBuf,
    pub garbage_collector_periodic_interval_ms: u64,
    pub max_container_name_size_bytes: usize,
    pub max_object_id_size_bytes: usize,
    pub max_object_data_size_bytes: usize,
    pub max_number_containers: usize,
    pub number_write_io_threads: usize,
    pub number_read_io_threads: usize,
    pub storage_engine_block_cache_size_mib: usize,
    pub container_index_number_buckets: u16,
    pub number_frontline_cache_shards: u16,
    pub max_frontline_cache_shard_size_mib: usize,
    pub max_frontline_cache_shard_object_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port_number: u16,
    pub server_logs_directory_path: PathBuf,
    pub server_number_threads: usize,
    pub server_listener_ip_address: String,
}

/// Root directory for all default data store paths, anchored at `$HOME`.
fn default_root_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cellar")
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            logs_directory_path: default_root_directory().join("logs"),
            component_name: "cellar-data-store".to_string(),
            queue_size_bytes: 8192,
            max_log_file_size_bytes: 16 * 1024 * 1024,
            max_number_files_for_session: 64,
            flush_frequency_ms: 3000,
            log_file_prefix: "cellar".to_string(),
            logging_session_directory_prefix: "session".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kv_store_path: default_root_directory().join("data"),
            garbage_collector_periodic_interval_ms: 500,
            max_container_name_size_bytes: 512,
            max_object_id_size_bytes: 512,
            max_object_data_size_bytes: 4 * 1024 * 1024,
            max_number_containers: 4096,
            number_write_io_threads: 1,
            number_read_io_threads: default_parallelism(),
            storage_engine_block_cache_size_mib: 64,
            container_index_number_buckets: 8,
            number_frontline_cache_shards: 64,
            max_frontline_cache_shard_size_mib: 16,
            max_frontline_cache_shard_object_size_bytes: 512 * 1024,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port_number: 8080,
            server_logs_directory_path: default_root_directory().join("server-logs"),
            server_number_threads: default_parallelism(),
            server_listener_ip_address: "0.0.0.0".to_string(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl SystemConfig {
    /// Loads the configuration from a TOML file, overlaying the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Creates the directories the data store needs before startup.
    pub fn set_up_system_directories(&self) -> Result<(), ConfigError> {
        for path in [
            &self.storage.kv_store_path,
            &self.logger.logs_directory_path,
            &self.server.server_logs_directory_path,
        ] {
            std::fs::create_dir_all(path).map_err(|source| ConfigError::Directory {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
