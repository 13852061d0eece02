//! Configuration management with validation and defaults
//!
//! Settings come from built-in presets or a TOML file, then environment
//! overrides are applied and the result is validated.

use crate::errors::{ChinchiroResult, ConfigurationError};
use crate::games::roll_service::RollServiceConfig;
use crate::games::round::RoundParams;
use crate::games::types::VariantId;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChinchiroConfig {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Parameters forwarded to the randomness oracle
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OracleConfig {
    pub key_hash: String,
    pub subscription_id: u64,
    pub confirmations: u16,
    pub callback_gas_limit: u32,
    pub batched_callback_gas_limit: u32,
    /// Derive all dice of a roll from a single oracle word
    pub batched_rolls: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let roll = RollServiceConfig::default();
        Self {
            key_hash: roll.key_hash,
            subscription_id: roll.subscription_id,
            confirmations: roll.confirmations,
            callback_gas_limit: roll.callback_gas_limit,
            batched_callback_gas_limit: roll.batched_callback_gas_limit,
            batched_rolls: false,
        }
    }
}

impl OracleConfig {
    pub fn roll_service_config(&self) -> RollServiceConfig {
        RollServiceConfig {
            key_hash: self.key_hash.clone(),
            subscription_id: self.subscription_id,
            confirmations: self.confirmations,
            callback_gas_limit: self.callback_gas_limit,
            batched_callback_gas_limit: self.batched_callback_gas_limit,
        }
    }
}

/// Default table parameters for new games
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableConfig {
    pub variant: u32,
    pub min_bet: u64,
    pub max_bet: u64,
    pub min_players: usize,
    pub max_players: usize,
    pub max_rounds: u32,
}

impl Default for TableConfig {
    fn default() -> Self {
        let params = RoundParams::default();
        Self {
            variant: params.variant.0,
            min_bet: params.min_bet,
            max_bet: params.max_bet,
            min_players: params.min_players,
            max_players: params.max_players,
            max_rounds: params.max_rounds,
        }
    }
}

impl TableConfig {
    pub fn round_params(&self) -> RoundParams {
        RoundParams {
            variant: VariantId(self.variant),
            min_bet: self.min_bet,
            max_bet: self.max_bet,
            min_players: self.min_players,
            max_players: self.max_players,
            max_rounds: self.max_rounds,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Funds credited to each simulated player
    pub starting_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CompressionType {
    None,
    Snappy,
    Lz4,
    Zstd,
}

/// Storage configuration with optimization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_directory: String,
    pub write_buffer_size_mb: usize,
    pub max_write_buffer_number: usize,
    pub compression_type: CompressionType,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_directory: "./DB/chinchiro_data".to_string(),
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            compression_type: CompressionType::Lz4,
            clear_on_start: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigurationError::InvalidValue {
                field: "monitoring.log_level".to_string(),
                value: s.to_string(),
                reason: "expected error, warn, info, debug or trace".to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Log every broadcast game event
    pub log_events: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_events: true,
        }
    }
}

impl ChinchiroConfig {
    /// Fast, in-memory settings for tests
    pub fn testing() -> Self {
        Self {
            oracle: OracleConfig {
                confirmations: 1,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                clear_on_start: true,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                log_events: false,
            },
            ..Default::default()
        }
    }

    /// Persistent settings
    pub fn production() -> Self {
        Self {
            oracle: OracleConfig {
                confirmations: 3,
                ..Default::default()
            },
            storage: StorageConfig {
                backend: StorageBackend::RocksDb,
                write_buffer_size_mb: 128,
                max_write_buffer_number: 6,
                clear_on_start: false,
                ..Default::default()
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Info,
                log_events: true,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.table
            .round_params()
            .validate()
            .map_err(|e| ConfigurationError::ValidationFailed(e.to_string()))?;

        if self.table.min_bet > self.ledger.starting_balance {
            return Err(ConfigurationError::InvalidValue {
                field: "ledger.starting_balance".to_string(),
                value: self.ledger.starting_balance.to_string(),
                reason: "must cover at least the minimum bet".to_string(),
            });
        }

        if self.oracle.callback_gas_limit == 0 || self.oracle.batched_callback_gas_limit == 0 {
            return Err(ConfigurationError::ValidationFailed(
                "callback gas limits must be > 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::RocksDb && self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> ChinchiroResult<ChinchiroConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => ChinchiroConfig::default(),
        };

        apply_overrides(&mut config, |name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    fn load_from_file(&self, path: &str) -> ChinchiroResult<ChinchiroConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Save configuration to file
    pub fn save(&self, config: &ChinchiroConfig, path: &str) -> ChinchiroResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: String, reason: &str) -> Result<T, ConfigurationError> {
    value.parse().map_err(|_| ConfigurationError::InvalidValue {
        field: name.to_string(),
        value,
        reason: reason.to_string(),
    })
}

/// Apply `CHINCHIRO_*` overrides read through `lookup`
pub fn apply_overrides(
    config: &mut ChinchiroConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigurationError> {
    if let Some(v) = lookup("CHINCHIRO_CONFIRMATIONS") {
        config.oracle.confirmations = parse_var("CHINCHIRO_CONFIRMATIONS", v, "Invalid confirmation count")?;
    }
    if let Some(v) = lookup("CHINCHIRO_CALLBACK_GAS_LIMIT") {
        let limit: u32 = parse_var("CHINCHIRO_CALLBACK_GAS_LIMIT", v, "Invalid gas limit")?;
        config.oracle.callback_gas_limit = limit;
        config.oracle.batched_callback_gas_limit = limit;
    }
    if let Some(v) = lookup("CHINCHIRO_BATCHED_ROLLS") {
        config.oracle.batched_rolls = parse_var("CHINCHIRO_BATCHED_ROLLS", v, "Invalid boolean value")?;
    }
    if let Some(v) = lookup("CHINCHIRO_STARTING_BALANCE") {
        config.ledger.starting_balance = parse_var("CHINCHIRO_STARTING_BALANCE", v, "Invalid balance")?;
    }
    if let Some(dir) = lookup("CHINCHIRO_DATA_DIR") {
        config.storage.data_directory = dir;
        config.storage.backend = StorageBackend::RocksDb;
    }
    if let Some(level) = lookup("CHINCHIRO_LOG_LEVEL") {
        config.monitoring.log_level = level.parse()?;
    }
    Ok(())
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> ChinchiroResult<()> {
    ConfigLoader::new().save(&ChinchiroConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_presets_are_valid() {
        assert!(ChinchiroConfig::default().validate().is_ok());
        assert!(ChinchiroConfig::testing().validate().is_ok());
        assert!(ChinchiroConfig::production().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_standard_table() {
        let config = ChinchiroConfig::default();
        assert_eq!(config.oracle.confirmations, 3);
        assert_eq!(config.oracle.callback_gas_limit, 20_000);
        assert!(!config.oracle.batched_rolls);
        assert_eq!(config.table.round_params(), RoundParams::default());
        assert_eq!(config.ledger.starting_balance, 10_000);
    }

    #[test]
    fn test_invalid_config_validation() {
        let mut config = ChinchiroConfig::default();
        config.table.max_bet = 50;
        assert!(config.validate().is_err());

        let mut config = ChinchiroConfig::default();
        config.ledger.starting_balance = 10;
        assert!(config.validate().is_err());

        let mut config = ChinchiroConfig::production();
        config.storage.data_directory.clear();
        assert!(matches!(config.validate(), Err(ConfigurationError::MissingRequired(_))));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CHINCHIRO_CONFIRMATIONS", "7"),
            ("CHINCHIRO_CALLBACK_GAS_LIMIT", "40000"),
            ("CHINCHIRO_BATCHED_ROLLS", "true"),
            ("CHINCHIRO_DATA_DIR", "/tmp/chinchiro"),
            ("CHINCHIRO_LOG_LEVEL", "TRACE"),
        ]
        .into_iter()
        .collect();

        let mut config = ChinchiroConfig::default();
        apply_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.oracle.confirmations, 7);
        assert_eq!(config.oracle.batched_callback_gas_limit, 40_000);
        assert!(config.oracle.batched_rolls);
        assert_eq!(config.storage.backend, StorageBackend::RocksDb);
        assert_eq!(config.monitoring.log_level, LogLevel::Trace);

        let err = apply_overrides(&mut config, |name| {
            (name == "CHINCHIRO_STARTING_BALANCE").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("CHINCHIRO_STARTING_BALANCE"));
    }

    #[test]
    fn test_save_and_load_config() -> ChinchiroResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = ChinchiroConfig::default();
        original.table.max_rounds = 3;
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.table.max_rounds, 3);
        assert_eq!(loaded.table.min_bet, original.table.min_bet);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: ChinchiroConfig = toml::from_str(
            r#"
            [ledger]
            starting_balance = 500
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.starting_balance, 500);
        assert_eq!(config.oracle.confirmations, 3);
    }
}
