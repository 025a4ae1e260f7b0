//! Server configuration, read from a TOML file:
//!
//! ```toml
//! bind_addr = "127.0.0.1:8080"
//! max_upload_bytes = 10485760
//! strict_amounts = true
//!
//! [[rules.hey]]
//! patterns = ["propias", "ahorro"]
//! case_sensitive = false
//! comment = "Traspaso entre cuentas propias"
//! include = "no"
//! ```
//!
//! Every key is optional. Banks without a `rules` entry keep their built-in rules.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

use estados_import::{AmountPolicy, Bank, ClassificationRule, RuleError, RuleSet, StatementProcessor};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "estados.toml";
pub const CONFIG_ENV: &str = "ESTADOS_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Unknown bank in rules: '{0}'")]
    UnknownBank(String),
    #[error("Invalid rules for {bank}: {source}")]
    Rules {
        bank: Bank,
        #[source]
        source: RuleError,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
    /// Report amount cells that could not be read instead of dropping them silently.
    pub strict_amounts: bool,
    /// Per-bank rule lists replacing the built-in ones, keyed by bank selector.
    pub rules: HashMap<String, Vec<ClassificationRule>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_upload_bytes: 10 * 1024 * 1024,
            strict_amounts: false,
            rules: HashMap::new(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Reads `path`; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    pub fn amount_policy(&self) -> AmountPolicy {
        if self.strict_amounts {
            AmountPolicy::Strict
        } else {
            AmountPolicy::Lenient
        }
    }

    pub fn processor(&self) -> Result<StatementProcessor, ConfigError> {
        let mut processor = StatementProcessor::new(self.amount_policy());
        for (name, rules) in &self.rules {
            let bank: Bank = name
                .parse()
                .map_err(|_| ConfigError::UnknownBank(name.clone()))?;
            let set = RuleSet::new(rules.clone())
                .map_err(|source| ConfigError::Rules { bank, source })?;
            tracing::info!(%bank, rules = set.len(), "using configured rules");
            processor = processor.with_rules(bank, set);
        }
        Ok(processor)
    }
}
