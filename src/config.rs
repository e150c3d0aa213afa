use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_FINGERPRINT_COLUMN, PackageId, UnparsedDatePolicy};
use crate::error::LedgerError;

pub const DEFAULT_CONFIG_FILE: &str = "shelter-ledger.json";
pub const DEFAULT_BASE_URL: &str = "https://ckan0.cf.opendata.inter.prod-toronto.ca";
pub const DEFAULT_PACKAGE_ID: &str = "daily-shelter-overnight-service-occupancy-capacity";
pub const DEFAULT_LEDGER_PATH: &str = "toronto_shelter_occupancy.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub package_id: Option<String>,
    #[serde(default)]
    pub ledger_path: Option<String>,
    #[serde(default)]
    pub fingerprint_column: Option<String>,
    #[serde(default)]
    pub strip_embedded_commas: Option<bool>,
    #[serde(default)]
    pub unparsed_dates: Option<UnparsedDatePolicy>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: Url,
    pub package_id: PackageId,
    pub ledger_path: Utf8PathBuf,
    pub fingerprint_column: String,
    pub strip_embedded_commas: bool,
    pub unparsed_dates: UnparsedDatePolicy,
    pub timeout: Duration,
    pub max_retries: usize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file. Without an explicit path a missing
    /// `shelter-ledger.json` means all defaults.
    pub fn load(path: Option<&str>) -> Result<Config, LedgerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LedgerError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| LedgerError::ConfigParse(err.to_string()))
    }

    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LedgerError> {
        Self::resolve_config(Self::load(path)?)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LedgerError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(LedgerError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let base_url = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(base_url.trim())
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            .ok_or(LedgerError::InvalidBaseUrl(base_url))?;

        let package_id = config
            .package_id
            .as_deref()
            .unwrap_or(DEFAULT_PACKAGE_ID)
            .parse()?;

        let ledger_path = Utf8PathBuf::from(
            config
                .ledger_path
                .unwrap_or_else(|| DEFAULT_LEDGER_PATH.to_string()),
        );
        if ledger_path.as_str().trim().is_empty() {
            return Err(LedgerError::InvalidConfig(
                "ledger_path must not be empty".to_string(),
            ));
        }

        let fingerprint_column = config
            .fingerprint_column
            .unwrap_or_else(|| DEFAULT_FINGERPRINT_COLUMN.to_string());
        if fingerprint_column.trim().is_empty() || fingerprint_column.contains(',') {
            return Err(LedgerError::InvalidConfig(format!(
                "fingerprint_column {fingerprint_column:?} is not a usable column name"
            )));
        }

        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(LedgerError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            base_url,
            package_id,
            ledger_path,
            fingerprint_column,
            strip_embedded_commas: config.strip_embedded_commas.unwrap_or(true),
            unparsed_dates: config.unparsed_dates.unwrap_or_default(),
            timeout: Duration::from_secs(timeout_secs),
            max_retries: config.max_retries.unwrap_or(0),
        })
    }
}
