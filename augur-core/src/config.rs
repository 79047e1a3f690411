use std::collections::BTreeMap;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::AugurError;

/// Environment variable holding the Postgres connection string.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AugurConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    /// Keyed by domain name (`insurance`, `churn`, `loan`, `rainfall`, `bigmart`).
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            max_connections: default_max_connections(),
        }
    }
}

impl StoreConfig {
    /// Connection string from the environment. Credentials never live in the config file.
    pub fn database_url(&self) -> Result<String, AugurError> {
        match std::env::var(DATABASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(AugurError::MissingEnv(DATABASE_URL_ENV)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DomainConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Path to a `.onnx` or `.json` model artifact. `~` and `$VARS` are expanded.
    pub model_path: String,
    /// ONNX input tensor name.
    #[serde(default = "default_input_name")]
    pub input_name: String,
}

fn default_enabled() -> bool {
    true
}

fn default_input_name() -> String {
    "float_input".to_string()
}

impl AugurConfig {
    /// Load from a TOML file, with `AUGUR__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("AUGUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Enabled domains in name order.
    pub fn enabled_domains(&self) -> impl Iterator<Item = (&str, &DomainConfig)> {
        self.domains
            .iter()
            .filter(|(_, d)| d.enabled)
            .map(|(name, d)| (name.as_str(), d))
    }
}
