//! Merged configuration and where it came from
//!
//! Layers are merged lowest precedence first. Every layer that contributed
//! is listed in `sources`, with the path and SHA-256 of file layers, so
//! `confgen config --json` shows exactly which files were read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use confgen_tree::{merge_layers, ConfigTree, ConfigValue};

use super::defaults::BuiltinDefaults;
use super::settings::Settings;
use crate::checksum::checksum_bytes;

pub const SCHEMA_VERSION: u32 = 1;

pub const SCHEMA_ID: &str = "confgen/effective_config@1";

/// Kind of layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    File,
    Cli,
}

/// One layer that took part in the merge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// Set for file layers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes, file layers only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl ConfigSource {
    fn inline(origin: ConfigOrigin) -> Self {
        Self {
            origin,
            path: None,
            digest: None,
        }
    }

    fn file(origin: ConfigOrigin, path: &Path, digest: String) -> Self {
        Self {
            origin,
            path: Some(path.display().to_string()),
            digest: Some(digest),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub schema_version: u32,

    pub schema_id: String,

    pub created_at: DateTime<Utc>,

    /// Result of merging every layer
    pub config: ConfigTree,

    /// Layers, lowest precedence first
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge builtin defaults, the host file, an explicit file and CLI
    /// overrides, in that order.
    ///
    /// A missing host file is skipped; a missing explicit file is an error.
    pub fn build(
        host_config_path: Option<&Path>,
        config_path: Option<&Path>,
        cli_overrides: Option<ConfigTree>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_tree()];
        let mut sources = vec![ConfigSource::inline(ConfigOrigin::Builtin)];

        let host_path = host_config_path.filter(|path| path.exists());
        let files = [(ConfigOrigin::Host, host_path), (ConfigOrigin::File, config_path)];
        for (origin, path) in files {
            if let Some(path) = path {
                let (tree, digest) = load_tree_file(path)?;
                layers.push(tree);
                sources.push(ConfigSource::file(origin, path, digest));
            }
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource::inline(ConfigOrigin::Cli));
        }

        let config = merge_layers(layers);
        Self::validate_config(&config)?;

        Ok(Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config,
            sources,
        })
    }

    fn validate_config(config: &ConfigTree) -> Result<(), ConfigError> {
        let int = |path: &str| config.get_path(path).and_then(ConfigValue::as_i64);
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if let Some(timeout) = int("lock_timeout_seconds") {
            if !(1..=3600).contains(&timeout) {
                return invalid(format!("lock_timeout_seconds must be in (0, 3600], got {}", timeout));
            }
        }

        let threshold = int("certificate.threshold_days").unwrap_or(crate::gate::DEFAULT_THRESHOLD_DAYS);
        if threshold < 0 {
            return invalid(format!("certificate.threshold_days must not be negative, got {}", threshold));
        }

        if let Some(lifetime) = int("certificate.lifetime_days") {
            if lifetime <= threshold {
                return invalid(format!(
                    "certificate.lifetime_days ({}) must be greater than threshold_days ({})",
                    lifetime, threshold
                ));
            }
        }

        Ok(())
    }

    /// Typed view of the merged tree
    pub fn settings(&self) -> Result<Settings, ConfigError> {
        serde_json::from_value(self.config.to_json())
            .map_err(|e| ConfigError::ValidationError(format!("settings: {}", e)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Value at a dotted path such as `certificate.dh_size`
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        self.config.get_path(path)
    }

    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(ConfigValue::as_i64)
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ConfigValue::as_str)
    }
}

/// Parse a TOML file, or JSON when the extension is `.json`.
///
/// Returns the tree and the SHA-256 of the raw bytes.
pub fn load_tree_file(path: &Path) -> Result<(ConfigTree, String), ConfigError> {
    let bytes = fs::read(path).map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
    let digest = checksum_bytes(&bytes);

    let contents = std::str::from_utf8(&bytes)
        .map_err(|e| ConfigError::ParseError(format!("{}: not UTF-8: {}", path.display(), e)))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        ConfigTree::from_json_str(contents)
    } else {
        ConfigTree::from_toml_str(contents)
    };

    let tree = parsed.map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
    Ok((tree, digest))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<io::Error> for ConfigError {
    fn from(e: io::Error) -> Self {
        ConfigError::IoError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn cli(value: serde_json::Value) -> Option<ConfigTree> {
        Some(ConfigTree::from_json(value).unwrap())
    }

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();

        assert_eq!(config.schema_version, SCHEMA_VERSION);
        assert_eq!(config.get_i64("certificate.threshold_days"), Some(10));
        assert_eq!(config.get_str("output_dir"), Some("/etc/snakeoil"));
    }

    #[test]
    fn test_build_with_cli_override() {
        let config = EffectiveConfig::build(
            None,
            None,
            cli(serde_json::json!({"certificate": {"dh_size": 4096}})),
        )
        .unwrap();

        assert_eq!(config.get_i64("certificate.dh_size"), Some(4096));
        // sibling keys survive the nested override
        assert_eq!(config.get_i64("certificate.key_size"), Some(4096));
        assert_eq!(config.get_i64("certificate.lifetime_days"), Some(365));
    }

    #[test]
    fn test_dh_size_floor_left_to_gate() {
        // the strength floor is a gate precondition, not a config error
        let config = EffectiveConfig::build(
            None,
            None,
            cli(serde_json::json!({"certificate": {"dh_size": 1024}})),
        )
        .unwrap();

        assert_eq!(config.settings().unwrap().certificate.dh_size, 1024);
    }

    #[test]
    fn test_validation_lifetime_vs_threshold() {
        let result = EffectiveConfig::build(
            None,
            None,
            cli(serde_json::json!({"certificate": {"lifetime_days": 10, "threshold_days": 10}})),
        );
        assert!(result.unwrap_err().to_string().contains("lifetime_days"));
    }

    #[test]
    fn test_validation_lock_timeout() {
        let result = EffectiveConfig::build(None, None, cli(serde_json::json!({"lock_timeout_seconds": 0})));
        assert!(result.unwrap_err().to_string().contains("lock_timeout_seconds"));
    }

    #[test]
    fn test_load_toml_file() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "store_dir = \"/var/lib/confgen\"").unwrap();
        writeln!(temp, "[certificate]").unwrap();
        writeln!(temp, "threshold_days = 20").unwrap();

        let config = EffectiveConfig::build(None, Some(temp.path()), None).unwrap();

        assert_eq!(config.get_str("store_dir"), Some("/var/lib/confgen"));
        assert_eq!(config.get_i64("certificate.threshold_days"), Some(20));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().unwrap().len(), 64);
    }

    #[test]
    fn test_load_json_file() {
        let mut temp = Builder::new().suffix(".json").tempfile().unwrap();
        write!(temp, r#"{{"output_dir": "/srv/pki"}}"#).unwrap();

        let config = EffectiveConfig::build(None, Some(temp.path()), None).unwrap();

        assert_eq!(config.get_str("output_dir"), Some("/srv/pki"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = EffectiveConfig::build(None, Some(Path::new("/nonexistent/confgen.toml")), None);
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_missing_host_file_is_skipped() {
        let config = EffectiveConfig::build(Some(Path::new("/nonexistent/host.toml")), None, None).unwrap();

        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_settings_extraction() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(settings.certificate.dh_size, 2048);
        assert_eq!(settings.commands.params[0], "openssl");
    }
}
