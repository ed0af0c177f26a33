//! Configuration loader. Resolves the application key from its configured
//! source and builds a ready-to-use `Hasher`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::entropy::{EntropyChain, InsecureFallback};
use crate::crypto::integrity::ApplicationKey;
use crate::crypto::passwords::{self, DEFAULT_ROUNDS};
use crate::hasher::Hasher;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable: {0}")]
    Io(String),
    #[error("config parse failed: {0}")]
    Parse(String),
    #[error("application key error: {0}")]
    Key(String),
    #[error("no application key source configured")]
    MissingKeySource,
    #[error("invalid hashing options: {0}")]
    InvalidHashing(String),
}

#[derive(Debug, Default, Deserialize)]
pub struct KeyConfig {
    /// Environment variable holding the key.
    pub key_env: Option<String>,
    /// Path to a file that contains the key.
    pub key_path: Option<PathBuf>,
    /// Inline key. Prefer one of the other sources outside of development.
    pub key: Option<String>,
}

impl KeyConfig {
    fn resolve(&self) -> Result<ApplicationKey, ConfigError> {
        if let Some(var) = &self.key_env {
            debug!(source = "env", var = %var, "loading application key");
            return ApplicationKey::from_env_var(var).map_err(|e| ConfigError::Key(format!("{e}")));
        }
        if let Some(path) = &self.key_path {
            debug!(source = "file", path = %path.display(), "loading application key");
            return ApplicationKey::from_key_file(path).map_err(|e| ConfigError::Key(format!("{e}")));
        }
        if let Some(key) = &self.key {
            debug!(source = "inline", "loading application key");
            return ApplicationKey::new(key.as_str()).map_err(|e| ConfigError::Key(format!("{e}")));
        }
        Err(ConfigError::MissingKeySource)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HashingConfig {
    pub rounds: Option<u32>,
    #[serde(rename = "allowInsecureSalt")]
    pub allow_insecure_salt: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub application: KeyConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
}

#[derive(Debug)]
pub struct RuntimeConfig {
    pub key: ApplicationKey,
    pub rounds: u32,
    pub fallback: InsecureFallback,
}

impl RuntimeConfig {
    /// Builds a `Hasher` carrying the resolved key, cost and salt policy.
    pub fn into_hasher(self) -> Result<Hasher, ConfigError> {
        Hasher::new()
            .with_key(self.key)
            .with_entropy(EntropyChain::system_default().with_fallback(self.fallback))
            .with_rounds(self.rounds)
            .map_err(|e| ConfigError::InvalidHashing(format!("{e}")))
    }
}

/// Parses configuration JSON and resolves the application key.
pub fn parse_config(raw_json: &str) -> Result<RuntimeConfig, ConfigError> {
    let raw: RawConfig =
        serde_json::from_str(raw_json).map_err(|e| ConfigError::Parse(format!("{e}")))?;

    let key = raw.application.resolve()?;
    let rounds = raw.hashing.rounds.unwrap_or(DEFAULT_ROUNDS);
    passwords::validate_cost(rounds).map_err(|e| ConfigError::InvalidHashing(format!("{e}")))?;

    let fallback = if raw.hashing.allow_insecure_salt.unwrap_or(false) {
        warn!("insecure salt fallback enabled; salts may come from a non-cryptographic generator");
        InsecureFallback::Permit
    } else {
        InsecureFallback::Refuse
    };

    Ok(RuntimeConfig {
        key,
        rounds,
        fallback,
    })
}

/// Loads the JSON configuration file and resolves the application key.
pub fn load_config(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let raw_json = fs::read_to_string(&path).map_err(|e| ConfigError::Io(format!("{e}")))?;
    parse_config(&raw_json)
}

#[cfg(test)]
mod tests {
    use super::{load_config, parse_config, ConfigError};
    use crate::crypto::entropy::InsecureFallback;
    use serde_json::json;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn loads_key_from_env() {
        let var = "HASHKIT_TEST_APPLICATION_KEY";
        std::env::set_var(var, "Jefe");

        let payload = json!({
            "application": { "key_env": var, "key_path": null },
            "hashing": { "rounds": 5 }
        });
        let file = NamedTempFile::new().expect("temp file");
        fs::write(file.path(), serde_json::to_vec(&payload).unwrap()).unwrap();

        let config = load_config(file.path()).expect("config should load");
        assert_eq!(config.key.as_bytes(), b"Jefe");
        assert_eq!(config.rounds, 5);
        assert_eq!(config.fallback, InsecureFallback::Refuse);

        let hasher = config.into_hasher().expect("rounds already validated");
        assert_eq!(hasher.rounds(), 5);
        assert_eq!(
            hasher.hmac_sha256_hex("what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn loads_key_from_file() {
        let key_file = NamedTempFile::new().expect("temp file");
        fs::write(key_file.path(), "file-key\n").unwrap();

        let payload = json!({
            "application": { "key_path": key_file.path() },
            "hashing": { "allowInsecureSalt": true }
        });
        let config = parse_config(&payload.to_string()).expect("config should load");
        assert_eq!(config.key.as_bytes(), b"file-key");
        assert_eq!(config.rounds, 8);
        assert_eq!(config.fallback, InsecureFallback::Permit);
    }

    #[test]
    fn inline_key_and_default_hashing_section() {
        let config = parse_config(r#"{"application": {"key": "inline"}}"#).unwrap();
        assert_eq!(config.key.as_bytes(), b"inline");
        assert_eq!(config.rounds, 8);
    }

    #[test]
    fn requires_a_key_source() {
        let err = parse_config(r#"{"application": {}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKeySource));
    }

    #[test]
    fn rejects_empty_keys() {
        let err = parse_config(r#"{"application": {"key": ""}}"#).unwrap_err();
        assert!(format!("{err}").contains("application key is empty"));
    }

    #[test]
    fn rejects_out_of_range_rounds() {
        let err =
            parse_config(r#"{"application": {"key": "k"}, "hashing": {"rounds": 2}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHashing(_)));
    }

    #[test]
    fn reports_unreadable_files() {
        let err = load_config("/nonexistent/hashkit/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
