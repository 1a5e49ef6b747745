//! Configuration module for PortalWatch.
//!
//! Loads configuration from environment variables, optionally seeded from a
//! `.env` file. The two target URLs are required; everything else has a default.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use thiserror::Error;

pub const DEFAULT_ORG_LABEL: &str = "PREFEITURA MUNICIPAL DE JAPERI";

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("failed to read environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenv::Error,
    },
    #[error("failed to create directory {path}: {source}")]
    Provision {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Monitor configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Site checked by the HTTP probe
    pub site_url: String,
    /// Portal driven by the browser probe
    pub portal_url: String,
    /// Organization option selected in the portal
    pub org_label: String,
    pub check_interval: Duration,
    /// Alert webhook; alerts are only logged when absent
    pub alert_webhook: Option<String>,
    pub timezone: Tz,
    /// Local hour (0-23) at which the daily report is generated
    pub daily_report_hour: u32,
    /// Base directory for logs, screenshots and reports
    pub report_dir: PathBuf,
    /// WebDriver (chromedriver) endpoint
    pub webdriver_url: String,
}

impl MonitorConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORTALWATCH_SITE_URL` (required)
    /// - `PORTALWATCH_PORTAL_URL` (required)
    /// - `PORTALWATCH_ORG_LABEL` (default: "PREFEITURA MUNICIPAL DE JAPERI")
    /// - `PORTALWATCH_CHECK_INTERVAL_MINUTES` (default: 180)
    /// - `PORTALWATCH_ALERT_WEBHOOK` (default: unset)
    /// - `PORTALWATCH_TIMEZONE` (default: "America/Sao_Paulo")
    /// - `PORTALWATCH_DAILY_REPORT_HOUR` (default: 23)
    /// - `PORTALWATCH_REPORT_DIR` (default: "relatorio")
    /// - `PORTALWATCH_WEBDRIVER_URL` (default: "http://localhost:9515")
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let site_url = required_url("PORTALWATCH_SITE_URL", get("PORTALWATCH_SITE_URL"))?;
        let portal_url = required_url("PORTALWATCH_PORTAL_URL", get("PORTALWATCH_PORTAL_URL"))?;

        let interval_minutes: u64 = parse_or("PORTALWATCH_CHECK_INTERVAL_MINUTES", get("PORTALWATCH_CHECK_INTERVAL_MINUTES"), 180)?;
        if interval_minutes == 0 {
            return Err(ConfigError::Invalid {
                key: "PORTALWATCH_CHECK_INTERVAL_MINUTES",
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }
        let check_interval = interval_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| ConfigError::Invalid {
                key: "PORTALWATCH_CHECK_INTERVAL_MINUTES",
                value: interval_minutes.to_string(),
                reason: "interval is too large".to_string(),
            })?;

        let daily_report_hour: u32 = parse_or("PORTALWATCH_DAILY_REPORT_HOUR", get("PORTALWATCH_DAILY_REPORT_HOUR"), 23)?;
        if daily_report_hour > 23 {
            return Err(ConfigError::Invalid {
                key: "PORTALWATCH_DAILY_REPORT_HOUR",
                value: daily_report_hour.to_string(),
                reason: "hour must be between 0 and 23".to_string(),
            });
        }

        let tz_name = get("PORTALWATCH_TIMEZONE").unwrap_or_else(|| "America/Sao_Paulo".to_string());
        let timezone = tz_name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
            key: "PORTALWATCH_TIMEZONE",
            value: tz_name.clone(),
            reason: e.to_string(),
        })?;

        let alert_webhook = match get("PORTALWATCH_ALERT_WEBHOOK") {
            Some(url) => Some(validate_url("PORTALWATCH_ALERT_WEBHOOK", url)?),
            None => None,
        };

        Ok(Self {
            site_url,
            portal_url,
            org_label: get("PORTALWATCH_ORG_LABEL").unwrap_or_else(|| DEFAULT_ORG_LABEL.to_string()),
            check_interval,
            alert_webhook,
            timezone,
            daily_report_hour,
            report_dir: get("PORTALWATCH_REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("relatorio")),
            webdriver_url: get("PORTALWATCH_WEBDRIVER_URL")
                .unwrap_or_else(|| "http://localhost:9515".to_string()),
        })
    }

    pub fn fail_dir(&self) -> PathBuf {
        self.report_dir.join("failures")
    }

    pub fn daily_dir(&self) -> PathBuf {
        self.report_dir.join("daily")
    }

    pub fn monthly_dir(&self) -> PathBuf {
        self.report_dir.join("monthly")
    }

    pub fn log_file(&self) -> PathBuf {
        self.report_dir.join("logs.jsonl")
    }

    /// Create the report, failure and log directories.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [self.report_dir.clone(), self.fail_dir(), self.daily_dir(), self.monthly_dir()] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

/// Seed the process environment from `.env` in the working directory or
/// its parents. Variables already set are kept. Returns the file used.
pub fn load_dotenv() -> Option<PathBuf> {
    dotenv::dotenv().ok()
}

/// Seed the process environment from a specific file. Variables already set
/// are kept.
pub fn load_dotenv_from(path: &Path) -> Result<(), ConfigError> {
    dotenv::from_path(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })
}

fn create_dir(path: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(path).map_err(|source| ConfigError::Provision {
        path: path.to_path_buf(),
        source,
    })
}

fn required_url(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    let value = value.ok_or(ConfigError::Missing(key))?;
    validate_url(key, value)
}

fn validate_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    match reqwest::Url::parse(&value) {
        Ok(_) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_or<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
