//! Built-in defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};
use serde_json::json;

use confgen_tree::ConfigTree;

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Directory holding one fingerprint file per artifact
    pub store_dir: String,

    /// Directory receiving generated key, request, certificate and DH files
    pub output_dir: String,

    /// Maximum wait for the per-artifact lock (default: 30)
    pub lock_timeout_seconds: u64,

    /// Certificate lifetime in days (default: 365)
    pub lifetime_days: i64,

    /// Regenerate when fewer days than this remain (default: 10)
    pub threshold_days: i64,

    /// RSA key size (default: 4096)
    pub key_size: u32,

    /// Diffie-Hellman modulus size (default: 2048)
    pub dh_size: u32,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            store_dir: "~/.cache/confgen/fingerprints".to_string(),
            output_dir: "/etc/snakeoil".to_string(),
            lock_timeout_seconds: 30,
            lifetime_days: 365,
            threshold_days: 10,
            key_size: 4096,
            dh_size: 2048,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a tree for merging
    pub fn to_tree(&self) -> ConfigTree {
        let value = json!({
            "store_dir": self.store_dir,
            "output_dir": self.output_dir,
            "lock_timeout_seconds": self.lock_timeout_seconds,
            "certificate": {
                "lifetime_days": self.lifetime_days,
                "threshold_days": self.threshold_days,
                "key_size": self.key_size,
                "dh_size": self.dh_size
            },
            "commands": {
                "request": [
                    "openssl", "req", "-new", "-newkey", "rsa:{key_size}", "-nodes",
                    "-keyout", "{key}", "-out", "{csr}", "-subj", "/CN={domain}"
                ],
                "sign": [
                    "openssl", "x509", "-req", "-days", "{days}",
                    "-in", "{csr}", "-signkey", "{key}", "-out", "{crt}"
                ],
                "params": ["openssl", "dhparam", "-out", "{dh}", "{dh_size}"]
            }
        });
        ConfigTree::from_json(value).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.lock_timeout_seconds, 30);
        assert_eq!(defaults.lifetime_days, 365);
        assert_eq!(defaults.threshold_days, 10);
        assert_eq!(defaults.dh_size, 2048);
    }

    #[test]
    fn test_to_tree() {
        let tree = BuiltinDefaults::default().to_tree();

        assert_eq!(tree.get_path("certificate.threshold_days").unwrap().as_i64(), Some(10));
        assert_eq!(tree.get_path("output_dir").unwrap().as_str(), Some("/etc/snakeoil"));
        let params = tree.get_path("commands.params").unwrap().as_sequence().unwrap();
        assert_eq!(params[0].as_str(), Some("openssl"));
    }
}
