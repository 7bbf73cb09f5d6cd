//! Configuration for the ledger

use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Database URL used by the SQLite adapter
    pub database_url: String,

    /// A balance under this value after an administrative adjustment triggers a notification
    pub low_balance_threshold: i64,

    /// History pagination
    pub history: HistoryConfig,

    /// Transfer directory
    pub directory: DirectoryConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://ledger.db".to_string(),
            low_balance_threshold: 100,
            history: HistoryConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

/// History pagination configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Page size when the caller does not ask for one
    pub default_per_page: u32,

    /// Largest page size a caller can ask for
    pub max_per_page: u32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            max_per_page: 100,
        }
    }
}

/// Transfer directory configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// Number of recent recipients returned when the caller does not ask for a limit
    pub default_limit: usize,

    /// Display name for recipients missing from the member directory
    pub unknown_member_name: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            unknown_member_name: "Unknown member".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
}

impl LedgerConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self, Error> {
        Self::default().with_vars(|name| std::env::var(name).ok())
    }

    /// Override fields from `LEDGER_*` variables
    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        if let Some(url) = var("LEDGER_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(value) = var("LEDGER_LOW_BALANCE_THRESHOLD") {
            self.low_balance_threshold = parse_var("LEDGER_LOW_BALANCE_THRESHOLD", value)?;
        }
        if let Some(value) = var("LEDGER_HISTORY_MAX_PER_PAGE") {
            self.history.max_per_page = parse_var("LEDGER_HISTORY_MAX_PER_PAGE", value)?;
        }

        Ok(self)
    }

    /// Page size to use for a requested size
    pub fn per_page(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.history.default_per_page)
            .clamp(1, self.history.max_per_page.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, Error> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidVar { name, value })
}
