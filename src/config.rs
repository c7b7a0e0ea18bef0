//! Configuration management for the lootcase service
//!
//! Values come from defaults, an optional TOML file, then `LOOTCASE_*`
//! environment variables, in that order. The final result is validated
//! before anything is built from it.

use crate::cases::types::PaymentMethod;
use crate::errors::{ConfigurationError, LootResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LootConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub fairness: FairnessConfig,
    #[serde(default = "PaymentMethod::defaults")]
    pub payment_methods: Vec<PaymentMethod>,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            catalog: CatalogConfig::default(),
            ledger: LedgerConfig::default(),
            fairness: FairnessConfig::default(),
            payment_methods: PaymentMethod::defaults(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// Catalog source. Without a path the built-in catalog is served.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub path: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Transaction log file. Balances live in memory only when unset.
    pub log_path: Option<String>,
    /// fsync after every append
    pub sync_writes: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            sync_writes: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RandomSourceKind {
    /// Operating system CSPRNG
    #[default]
    Os,
    /// Verifiable draws signed with the house key
    Vrf,
}

impl std::str::FromStr for RandomSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "os" => Ok(RandomSourceKind::Os),
            "vrf" => Ok(RandomSourceKind::Vrf),
            other => Err(format!("unknown random source '{}' (expected os or vrf)", other)),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FairnessConfig {
    pub source: RandomSourceKind,
    /// Hex-encoded schnorrkel secret key. A fresh key is generated at
    /// startup when unset, so proofs only verify for this process.
    pub vrf_secret_key: Option<String>,
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> LootResult<LootConfig> {
        let mut config = match &self.config_path {
            Some(path) => self.load_from_file(path)?,
            None => LootConfig::default(),
        };

        apply_overrides(&mut config, |key| env::var(key).ok())?;
        self.validate(&config)?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> LootResult<LootConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    pub fn validate(&self, config: &LootConfig) -> LootResult<()> {
        if config.server.port == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.port".to_string(),
                value: "0".to_string(),
                reason: "Port cannot be zero".to_string(),
            }
            .into());
        }

        if config.server.request_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.request_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "Timeout cannot be zero".to_string(),
            }
            .into());
        }

        if let Some(path) = &config.ledger.log_path {
            if path.trim().is_empty() {
                return Err(ConfigurationError::MissingRequired("ledger.log_path".to_string()).into());
            }
        }

        if config.payment_methods.is_empty() {
            return Err(ConfigurationError::MissingRequired("payment_methods".to_string()).into());
        }

        let mut seen = HashSet::new();
        for method in &config.payment_methods {
            if method.id.trim().is_empty() {
                return Err(ConfigurationError::InvalidValue {
                    field: "payment_methods.id".to_string(),
                    value: method.id.clone(),
                    reason: "Payment method id cannot be empty".to_string(),
                }
                .into());
            }
            if !seen.insert(method.id.as_str()) {
                return Err(ConfigurationError::InvalidValue {
                    field: "payment_methods.id".to_string(),
                    value: method.id.clone(),
                    reason: "Duplicate payment method id".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    pub fn save(&self, config: &LootConfig, path: &str) -> LootResult<()> {
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

fn invalid(field: &str, value: String, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    }
}

/// Apply `LOOTCASE_*` overrides read through `lookup`
fn apply_overrides<F>(config: &mut LootConfig, lookup: F) -> LootResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("LOOTCASE_HOST") {
        config.server.host = host;
    }
    if let Some(port) = lookup("LOOTCASE_PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| invalid("LOOTCASE_PORT", port, "Invalid port number"))?;
    }
    if let Some(origins) = lookup("LOOTCASE_ALLOWED_ORIGINS") {
        config.server.allowed_origins = origins
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
    }
    if let Some(path) = lookup("LOOTCASE_CATALOG_PATH") {
        config.catalog.path = Some(path);
    }
    if let Some(path) = lookup("LOOTCASE_LEDGER_PATH") {
        config.ledger.log_path = Some(path);
    }
    if let Some(sync) = lookup("LOOTCASE_LEDGER_SYNC") {
        config.ledger.sync_writes = sync
            .parse()
            .map_err(|_| invalid("LOOTCASE_LEDGER_SYNC", sync, "Invalid boolean value"))?;
    }
    if let Some(source) = lookup("LOOTCASE_RANDOM_SOURCE") {
        config.fairness.source = source
            .parse()
            .map_err(|reason: String| invalid("LOOTCASE_RANDOM_SOURCE", source.clone(), &reason))?;
    }
    if let Some(secret) = lookup("LOOTCASE_VRF_SECRET_KEY") {
        config.fairness.vrf_secret_key = Some(secret);
    }

    Ok(())
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: LootConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: LootConfig::default(),
        }
    }

    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    pub fn catalog_path(mut self, path: impl Into<String>) -> Self {
        self.config.catalog.path = Some(path.into());
        self
    }

    pub fn ledger(mut self, ledger: LedgerConfig) -> Self {
        self.config.ledger = ledger;
        self
    }

    pub fn random_source(mut self, source: RandomSourceKind) -> Self {
        self.config.fairness.source = source;
        self
    }

    pub fn payment_methods(mut self, methods: Vec<PaymentMethod>) -> Self {
        self.config.payment_methods = methods;
        self
    }

    pub fn build(self) -> LootConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the default configuration to `path`
pub fn generate_sample_config(path: &str) -> LootResult<()> {
    ConfigLoader::new().save(&LootConfig::default(), path)
}
