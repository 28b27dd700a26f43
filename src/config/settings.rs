//! Typed view of the merged configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::pki::CommandTemplates;

/// Certificate generation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateSettings {
    pub lifetime_days: i64,
    pub threshold_days: i64,
    pub key_size: u32,
    pub dh_size: u32,
}

/// Settings consumed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub store_dir: String,
    pub output_dir: String,
    pub lock_timeout_seconds: u64,
    pub certificate: CertificateSettings,
    pub commands: CommandTemplates,
}

impl Settings {
    /// Fingerprint store directory with `~/` expanded
    pub fn store_path(&self) -> PathBuf {
        expand_home(&self.store_dir)
    }

    /// Output directory with `~/` expanded
    pub fn output_path(&self) -> PathBuf {
        expand_home(&self.output_dir)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

/// Expand a leading `~/` using `$HOME`
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
