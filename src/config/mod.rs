//! Configuration layering
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host config (~/.config/confgen/config.toml)
//! 3. Explicit config file (--config)
//! 4. CLI flags

mod defaults;
mod effective;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{load_tree_file, ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use settings::{expand_home, CertificateSettings, Settings};

/// Host-level config file location, relative to `$HOME`
pub const HOST_CONFIG_PATH: &str = "~/.config/confgen/config.toml";
