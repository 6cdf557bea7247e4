//! Dredge configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main dredge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database location
    pub database: DatabaseConfig,

    /// Tool protocol server
    pub server: ServerConfig,

    /// Job queue and dispatcher
    pub queue: QueueConfig,

    /// Default task budgets
    pub budget: BudgetConfig,

    /// Status service thresholds
    pub status: StatusConfig,

    /// Notification sink
    pub notify: NotifyConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .dredge.yml
        let local_config = PathBuf::from(".dredge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/dredge/dredge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dredge").join("dredge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Database location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (env `DREDGE_DB_PATH` overrides)
    pub path: PathBuf,
}

impl DatabaseConfig {
    /// Effective path after applying the environment override
    pub fn effective_path(&self) -> PathBuf {
        std::env::var("DREDGE_DB_PATH").map(PathBuf::from).unwrap_or_else(|_| self.path.clone())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dredge")
                .join("dredge.db"),
        }
    }
}

/// Tool protocol server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unix socket the tool protocol listens on
    #[serde(rename = "socket-path")]
    pub socket_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: dirs::runtime_dir()
                .or_else(dirs::data_local_dir)
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("dredge")
                .join("dredge.sock"),
        }
    }
}

/// Job queue and dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker count per slot class
    pub slots: HashMap<String, usize>,

    /// Fallback poll interval when no wake signal arrives
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,

    /// How long `stop_task(immediate)` waits for running jobs to observe
    /// cancellation before returning anyway
    #[serde(rename = "immediate-stop-wait-ms")]
    pub immediate_stop_wait_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            slots: HashMap::from([("network_client".to_string(), 1)]),
            poll_interval_ms: 500,
            immediate_stop_wait_ms: 5_000,
        }
    }
}

/// Default task budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Default page budget for new tasks
    #[serde(rename = "default-pages")]
    pub default_pages: i64,

    /// Default time budget in seconds for new tasks
    #[serde(rename = "default-max-seconds")]
    pub default_max_seconds: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_pages: 120,
            default_max_seconds: 1200,
        }
    }
}

/// Status service thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Idle seconds before get_status emits an idle warning
    #[serde(rename = "idle-warn-secs")]
    pub idle_warn_secs: u64,

    /// Harvest rate below which a search counts as diminishing returns
    #[serde(rename = "low-harvest-rate")]
    pub low_harvest_rate: f64,

    /// Pages a search must have fetched before the harvest warning applies
    #[serde(rename = "harvest-min-pages")]
    pub harvest_min_pages: i64,

    /// Idle seconds after which cached exploration state is evicted
    #[serde(rename = "eviction-secs")]
    pub eviction_secs: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            idle_warn_secs: 300,
            low_harvest_rate: 0.1,
            harvest_min_pages: 10,
            eviction_secs: 1800,
        }
    }
}

/// Notification sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Webhook URL notifications are POSTed to; unset disables delivery
    #[serde(rename = "webhook-url")]
    pub webhook_url: Option<String>,

    /// Delivery timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 3_000,
        }
    }
}
