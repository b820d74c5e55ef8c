//! Configuration management for the harvest server

use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_store::{ExplorerConfig, ScanSettings};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Scanner configuration
    pub scanner: ScannerConfig,
    /// Explorer API configuration
    pub explorer: ExplorerConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

/// Scan loop and batch file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Directory holding progress, manifest and batch files
    pub data_dir: PathBuf,
    /// Height used when no progress record exists
    pub start_block: u64,
    /// Blocks processed per scan run
    pub max_blocks_per_run: u64,
    /// Pause between fetched blocks in seconds
    pub api_delay_secs: u64,
    /// Batches kept by a cleanup request without explicit count
    pub max_files_to_keep: usize,
    /// Currency unit written in the balance log
    pub unit: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(config::File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder()?
            // Configuration file
            .add_source(config::File::with_name("config/harvest").required(false))
            // Environment variables, e.g. HARVEST__SCANNER__MAX_BLOCKS_PER_RUN=50
            .add_source(config::Environment::with_prefix("HARVEST").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        let explorer = ExplorerConfig::default();
        config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3050)?
            .set_default("scanner.data_dir", "data")?
            .set_default("scanner.start_block", 0)?
            .set_default("scanner.max_blocks_per_run", 20)?
            .set_default("scanner.api_delay_secs", 2)?
            .set_default("scanner.max_files_to_keep", 5)?
            .set_default("scanner.unit", "BTC")?
            .set_default("explorer.url", explorer.url)?
            .set_default("explorer.block_timeout_secs", explorer.block_timeout_secs as i64)?
            .set_default("explorer.balance_timeout_secs", explorer.balance_timeout_secs as i64)?
            .set_default("explorer.max_retries", explorer.max_retries as i64)?
            .set_default("explorer.retry_backoff_ms", explorer.retry_backoff_ms as i64)
    }

    /// Get the socket address for the server
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    /// Scan loop settings derived from the scanner section
    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            start_block: self.scanner.start_block,
            max_blocks_per_run: self.scanner.max_blocks_per_run,
            api_delay: Duration::from_secs(self.scanner.api_delay_secs),
        }
    }
}
