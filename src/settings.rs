use std::{fs, path::Path};

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::AnalysisConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("unknown timezone identifier '{0}'")]
    Timezone(String),
    #[error("acquisition.program must not be empty")]
    MissingProgram,
    #[error("supervisor.{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// How to launch the external acquisition process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Abort an attempt when the process emits nothing for this long.
    pub stall_timeout_secs: u64,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// Consecutive attempts without a single persisted reading before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            stall_timeout_secs: 60,
            initial_backoff_secs: 2,
            max_backoff_secs: 300,
            max_consecutive_failures: 10,
        }
    }
}

/// On-disk shape of the config file. Everything except the acquisition command
/// has a usable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConfig {
    #[serde(default = "default_db_path")]
    db_path: String,
    #[serde(default = "default_mirror_dir")]
    mirror_dir: String,
    acquisition: AcquisitionCommand,
    #[serde(default = "default_timezone")]
    timezone: String,
    #[serde(default)]
    supervisor: SupervisorConfig,
    #[serde(default)]
    analysis: AnalysisConfig,
}

fn default_db_path() -> String {
    "oximon.sqlite3".into()
}

fn default_mirror_dir() -> String {
    "oximon_logs".into()
}

fn default_timezone() -> String {
    "UTC".into()
}

/// Validated runtime configuration, constructed once at startup and handed
/// into each component. No component reads ambient global state.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: std::path::PathBuf,
    pub mirror_dir: std::path::PathBuf,
    pub acquisition: AcquisitionCommand,
    pub timezone: Tz,
    pub supervisor: SupervisorConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw: RawConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        if raw.acquisition.program.trim().is_empty() {
            return Err(ConfigError::MissingProgram);
        }
        if raw.supervisor.stall_timeout_secs == 0 {
            return Err(ConfigError::ZeroInterval("stall_timeout_secs"));
        }
        if raw.supervisor.max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroInterval("max_consecutive_failures"));
        }
        let timezone: Tz = raw
            .timezone
            .parse()
            .map_err(|_| ConfigError::Timezone(raw.timezone.clone()))?;

        Ok(Self {
            db_path: raw.db_path.into(),
            mirror_dir: raw.mirror_dir.into(),
            acquisition: raw.acquisition,
            timezone,
            supervisor: raw.supervisor,
            analysis: raw.analysis,
        })
    }
}
