//! Content checksums
//!
//! Rendered configuration files are regenerated only when their content
//! checksum differs from the one persisted after the last run.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Read size when hashing files (64 KiB)
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 hex digest of a byte slice
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest of a file's contents; `Ok(None)` when the file is absent
pub fn checksum_file(path: &Path) -> io::Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Some(hex::encode(hasher.finalize())))
}

/// Result of comparing a checksum against the persisted one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecksumStatus {
    /// True when the stored checksum is missing or different
    pub changed: bool,
    /// Current checksum
    pub checksum: String,
    /// Checksum found on disk, if any
    pub previous: Option<String>,
}

/// A file holding one checksum on its first line
#[derive(Debug, Clone)]
pub struct ChecksumFile {
    path: PathBuf,
}

impl ChecksumFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored checksum, if the file exists and is non-empty
    pub fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents
                .lines()
                .next()
                .map(|line| line.trim().to_string())
                .filter(|line| !line.is_empty())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Compare `checksum` with the stored value
    pub fn validate(&self, checksum: &str) -> io::Result<ChecksumStatus> {
        let previous = self.read()?;
        let changed = previous.as_deref() != Some(checksum);

        debug!(
            path = %self.path.display(),
            changed,
            checksum,
            previous = previous.as_deref().unwrap_or("-"),
            "checksum validated"
        );

        Ok(ChecksumStatus {
            changed,
            checksum: checksum.to_string(),
            previous,
        })
    }

    /// Persist `checksum` (write-then-rename)
    pub fn write(&self, checksum: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, format!("{}\n", checksum))?;
        fs::rename(&temp_path, &self.path)
    }

    /// Delete the stored checksum; returns whether one existed
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Pick the checksum of one release archive out of a `sha256sums` listing.
///
/// Lines look like
/// `206cf787...e04b  alertmanager-0.25.0.linux-amd64.tar.gz`; the archive is
/// matched by application name, operating system, architecture and file
/// extension.
pub fn parse_checksum<S: AsRef<str>>(
    lines: &[S],
    application: &str,
    os: &str,
    arch: &str,
    extension: &str,
) -> Option<String> {
    let pattern = format!(
        r"^(?P<checksum>[A-Fa-f0-9]+)\s+\*?\S*{}[-_]\S*{}[-_]{}\.{}$",
        regex_lite::escape(application),
        regex_lite::escape(&os.to_lowercase()),
        regex_lite::escape(arch),
        regex_lite::escape(extension),
    );
    let re = Regex::new(&pattern).ok()?;

    lines.iter().find_map(|line| {
        re.captures(line.as_ref().trim())
            .and_then(|caps| caps.name("checksum"))
            .map(|m| m.as_str().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checksum_bytes() {
        assert_eq!(
            checksum_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_checksum_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jail.local");
        fs::write(&path, "[sshd]\nenabled = true\n").unwrap();

        assert_eq!(
            checksum_file(&path).unwrap(),
            Some(checksum_bytes(b"[sshd]\nenabled = true\n"))
        );
        assert_eq!(checksum_file(&temp.path().join("missing")).unwrap(), None);
    }

    #[test]
    fn test_checksum_file_spans_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big");
        let data = vec![b'x'; READ_CHUNK_SIZE * 2 + 17];
        fs::write(&path, &data).unwrap();

        assert_eq!(checksum_file(&path).unwrap(), Some(checksum_bytes(&data)));
    }

    #[test]
    fn test_validate_and_write() {
        let temp = TempDir::new().unwrap();
        let file = ChecksumFile::new(temp.path().join("cache").join("jail.sha256"));

        let first = file.validate("aaa").unwrap();
        assert!(first.changed);
        assert_eq!(first.previous, None);

        file.write("aaa").unwrap();
        let second = file.validate("aaa").unwrap();
        assert!(!second.changed);
        assert_eq!(second.previous.as_deref(), Some("aaa"));

        let third = file.validate("bbb").unwrap();
        assert!(third.changed);
        assert_eq!(third.previous.as_deref(), Some("aaa"));
    }

    #[test]
    fn test_remove() {
        let temp = TempDir::new().unwrap();
        let file = ChecksumFile::new(temp.path().join("x.sha256"));
        file.write("aaa").unwrap();

        assert!(file.remove().unwrap());
        assert!(!file.remove().unwrap());
        assert_eq!(file.read().unwrap(), None);
    }

    #[test]
    fn test_parse_checksum() {
        let listing = [
            "0a1b2c  alertmanager-0.25.0.darwin-arm64.tar.gz",
            "206cf787c01921574ca171220bb9b48b043c3ad6e744017030fed586eb48e04b  alertmanager-0.25.0.linux-amd64.tar.gz",
            "ffff  alertmanager-0.25.0.linux-arm64.tar.gz",
        ];

        assert_eq!(
            parse_checksum(&listing, "alertmanager", "Linux", "amd64", "tar.gz").as_deref(),
            Some("206cf787c01921574ca171220bb9b48b043c3ad6e744017030fed586eb48e04b")
        );
        assert_eq!(
            parse_checksum(&listing, "alertmanager", "linux", "arm64", "tar.gz").as_deref(),
            Some("ffff")
        );
        assert_eq!(parse_checksum(&listing, "alertmanager", "windows", "amd64", "zip"), None);
    }
}
