//! Persisted artifact fingerprints
//!
//! One JSON file per artifact identifier records what was last generated:
//! when, until when it stays valid, at which strength, and the checksum of
//! the primary output. A missing file means the artifact was never
//! generated (or was reset).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Schema version for fingerprint files
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "confgen/fingerprint@1";

/// Recorded generation state of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Stable artifact identifier (e.g. certificate domain)
    pub identifier: String,

    /// When the artifact was generated
    pub created_at: DateTime<Utc>,

    /// End of the validity window for time-bounded artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Strength parameter used (DH modulus size, key size)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<u32>,

    /// Private key size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_size: Option<u32>,

    /// SHA-256 of the primary output file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl Fingerprint {
    pub fn new(identifier: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            identifier: identifier.into(),
            created_at,
            expires_at: None,
            strength: None,
            key_size: None,
            checksum: None,
        }
    }

    /// Set the expiry to `created_at + days`
    pub fn with_lifetime_days(mut self, days: i64) -> Self {
        self.expires_at = Some(self.created_at + Duration::days(days));
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_strength(mut self, strength: u32) -> Self {
        self.strength = Some(strength);
        self
    }

    pub fn with_key_size(mut self, key_size: u32) -> Self {
        self.key_size = Some(key_size);
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Whole days left until expiry, truncated toward zero.
    ///
    /// `None` when the fingerprint carries no expiry.
    pub fn remaining_days(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|expires| (expires - now).num_days())
    }

    /// True once the expiry instant has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expires| expires <= now).unwrap_or(false)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Errors for fingerprint store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid artifact identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("corrupt fingerprint {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Directory of fingerprint files keyed by identifier
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    root: PathBuf,
}

impl FingerprintStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the fingerprint file for `identifier`
    pub fn path_for(&self, identifier: &str) -> Result<PathBuf, StoreError> {
        let name = file_stem(identifier)?;
        Ok(self.root.join(format!("{}.json", name)))
    }

    /// Load the fingerprint for `identifier`; `Ok(None)` when none exists
    pub fn load(&self, identifier: &str) -> Result<Option<Fingerprint>, StoreError> {
        let path = self.path_for(identifier)?;

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Fingerprint::from_json(&json)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    /// Write atomically (write-then-rename), replacing any previous record
    pub fn save(&self, fingerprint: &Fingerprint) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&fingerprint.identifier)?;
        fs::create_dir_all(&self.root)?;

        let json = fingerprint.to_json()?;

        // Write to temp file first
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &json)?;

        // Atomic rename
        fs::rename(&temp_path, &path)?;

        debug!(identifier = %fingerprint.identifier, path = %path.display(), "fingerprint saved");
        Ok(path)
    }

    /// Delete the fingerprint; returns whether one existed
    pub fn reset(&self, identifier: &str) -> Result<bool, StoreError> {
        let path = self.path_for(identifier)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Filesystem-safe stem for an identifier.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`. Empty identifiers and
/// the dot-only names `.`/`..` are rejected.
pub fn file_stem(identifier: &str) -> Result<String, StoreError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        return Err(StoreError::InvalidIdentifier(identifier.to_string()));
    }

    Ok(trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect())
}
