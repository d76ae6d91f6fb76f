use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use aof_views::KanbanMode;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Root of the persisted layout (tasks/, events/, views/, daemon.pid)
    pub data_dir: String,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub cascade: CascadeConfig,
    pub views: ViewsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Listen address for the health endpoint
    pub listen_addr: String,
    /// Port number to listen on
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Observe without mutating: skip lease expiry actions
    pub dry_run: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CascadeConfig {
    /// Opt-in: block direct dependents when an upstream task blocks
    pub on_block: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ViewsConfig {
    /// Kanban swimlane mode
    pub kanban_mode: KanbanMode,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json, compact)
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

impl Config {
    /// Load configuration from environment variables and config files
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // Start with default configuration
        builder = builder.add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        // Add config file if specified
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        // Add environment variable overrides with AOF_ prefix
        builder = builder.add_source(
            Environment::with_prefix("AOF")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Handle standard environment variables (AOF_DATA_DIR, LISTEN_ADDR,
        // LOG_LEVEL) for compatibility with common deployment patterns
        Self::apply_standard_env_vars(&mut result);

        Ok(result)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self> {
        let builder = ConfigBuilder::builder()
            .add_source(File::from_str(
                include_str!("../config/default.toml"),
                FileFormat::Toml,
            ))
            .add_source(File::with_name(path).format(FileFormat::Toml))
            .add_source(
                Environment::with_prefix("AOF")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder
            .build()
            .context("Failed to build configuration from file")?;

        let mut result: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration from file")?;
        Self::apply_standard_env_vars(&mut result);
        Ok(result)
    }

    fn apply_standard_env_vars(config: &mut Config) {
        if let Ok(data_dir) = env::var("AOF_DATA_DIR") {
            config.data_dir = data_dir;
        }

        if let Ok(listen_addr) = env::var("LISTEN_ADDR") {
            config.server.listen_addr = listen_addr;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn pid_file(&self) -> PathBuf {
        self.data_dir().join("daemon.pid")
    }

    pub fn project_config_path(&self) -> PathBuf {
        self.data_dir().join("project.yaml")
    }

    pub fn org_chart_path(&self) -> PathBuf {
        self.data_dir().join("org").join("org-chart.yaml")
    }

    /// Get the health server socket address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.listen_addr, self.server.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    self.logging.level
                ));
            }
        }

        if self.data_dir.trim().is_empty() {
            return Err(anyhow::anyhow!("data_dir cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.scheduler.poll_interval_ms < 1000 {
            return Err(anyhow::anyhow!(
                "Scheduler poll interval must be at least 1000 ms, got {}",
                self.scheduler.poll_interval_ms
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: ".".to_string(),
            server: ServerConfig {
                listen_addr: "127.0.0.1".to_string(),
                port: 7171,
            },
            scheduler: SchedulerConfig {
                poll_interval_ms: 30_000,
                dry_run: false,
            },
            cascade: CascadeConfig { on_block: false },
            views: ViewsConfig {
                kanban_mode: KanbanMode::Priority,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
