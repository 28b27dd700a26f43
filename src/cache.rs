//! Age-based validity of cached files

use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::debug;

/// True when `path` exists and was modified less than `max_age` ago.
///
/// A stale file is deleted when `remove_stale` is set, so the next run
/// starts from a clean slate.
pub fn cache_valid(path: &Path, max_age: Duration, remove_stale: bool) -> io::Result<bool> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no cache file");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let modified = metadata.modified()?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    let stale = age > max_age;

    debug!(
        path = %path.display(),
        age_secs = age.as_secs(),
        max_age_secs = max_age.as_secs(),
        stale,
        "cache file checked"
    );

    if stale && remove_stale {
        fs::remove_file(path)?;
    }

    Ok(!stale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_is_invalid() {
        let temp = TempDir::new().unwrap();
        assert!(!cache_valid(&temp.path().join("facts.json"), Duration::from_secs(60), true).unwrap());
    }

    #[test]
    fn test_fresh_is_valid() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("facts.json");
        fs::write(&path, "{}").unwrap();

        assert!(cache_valid(&path, Duration::from_secs(3600), true).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_stale_is_removed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("facts.json");
        fs::write(&path, "{}").unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert!(!cache_valid(&path, Duration::ZERO, false).unwrap());
        assert!(path.exists());

        assert!(!cache_valid(&path, Duration::ZERO, true).unwrap());
        assert!(!path.exists());
    }
}
