use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AkerConfig {
    pub schedule: ScheduleFiles,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Locations of the persisted schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleFiles {
    /// Schedule document read by the loader and written by create/update requests
    pub data_file: PathBuf,

    /// Checksum of the schedule document, returned verbatim on request
    pub checksum_file: PathBuf,
}

/// Scheduler loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerSettings {
    /// Pause between evaluation cycles (seconds)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Log "no change" only every Nth unchanged cycle
    #[serde(default = "default_no_change_log_period")]
    pub no_change_log_period: u32,
}

/// Request socket of the running agent
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    /// Unix socket accepting JSON-line requests; `aker request` talks to it
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_no_change_log_period() -> u32 {
    3
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/aker/aker.sock")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            no_change_log_period: default_no_change_log_period(),
        }
    }
}

impl SchedulerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AkerConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse and validate configuration from TOML
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AkerConfig = toml::from_str(content).context("Invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.schedule.data_file.as_os_str().is_empty() {
            anyhow::bail!("schedule.data_file must not be empty");
        }

        if self.schedule.checksum_file.as_os_str().is_empty() {
            anyhow::bail!("schedule.checksum_file must not be empty");
        }

        if self.schedule.data_file == self.schedule.checksum_file {
            anyhow::bail!(
                "schedule.data_file and schedule.checksum_file must differ (both are {})",
                self.schedule.data_file.display()
            );
        }

        if self.server.socket_path.as_os_str().is_empty() {
            anyhow::bail!("server.socket_path must not be empty");
        }

        if self.scheduler.poll_interval == 0 {
            anyhow::bail!("Poll interval must be at least 1 second");
        }

        if self.scheduler.no_change_log_period == 0 {
            anyhow::bail!("no_change_log_period must be at least 1");
        }

        Ok(())
    }
}

/// Get the platform-specific agent config file path
pub fn get_config_path() -> Result<PathBuf> {
    #[cfg(unix)]
    {
        Ok(PathBuf::from("/etc/aker/aker.toml"))
    }

    #[cfg(windows)]
    {
        let mut path = PathBuf::from(
            std::env::var("ProgramData").unwrap_or_else(|_| "C:\\ProgramData".to_string()),
        );
        path.push("aker");
        path.push("aker.toml");
        Ok(path)
    }

    #[cfg(not(any(unix, windows)))]
    {
        anyhow::bail!("Unsupported operating system");
    }
}
