//! Durable storage for the test history.
//!
//! A [`DurableStore`] holds exactly one value: the ordered history
//! sequence. [`JsonFileStore`] keeps it as a JSON array on disk,
//! [`MemoryStore`] keeps it in process.

use crate::errors::ScannerError;
use crate::results::TestResult;
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File name used when no data directory can be found.
const FALLBACK_FILE_NAME: &str = "net-scanner-history.json";

/// Key/value capability holding the history sequence.
pub trait DurableStore {
    /// The stored sequence, or `None` when nothing usable is stored.
    ///
    /// Unreadable or unparsable data is reported as `None`, not as an
    /// error.
    fn get_history(&self) -> Option<Vec<TestResult>>;

    /// Replace the stored sequence.
    fn set_history(&self, history: &[TestResult]) -> Result<(), ScannerError>;
}

/// History persisted as a pretty-printed JSON array.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_history_path`].
    pub fn open_default() -> Self {
        Self::new(default_history_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent_directory(&self) -> io::Result<()> {
        match self.path.parent() {
            Some(parent)
                if !parent.as_os_str().is_empty() && !parent.exists() =>
            {
                debug!("Creating history directory: {}", parent.display());
                fs::create_dir_all(parent)
            }
            _ => Ok(()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl DurableStore for JsonFileStore {
    fn get_history(&self) -> Option<Vec<TestResult>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No history file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!(
                    "Failed to read history file '{}': {}",
                    self.path.display(),
                    e
                );
                return None;
            }
        };

        match serde_json::from_str::<Vec<TestResult>>(&content) {
            Ok(history) => {
                debug!(
                    "Loaded {} results from {}",
                    history.len(),
                    self.path.display()
                );
                Some(history)
            }
            Err(e) => {
                warn!(
                    "Ignoring malformed history file '{}': {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    fn set_history(&self, history: &[TestResult]) -> Result<(), ScannerError> {
        let write_failed = |e: io::Error| {
            ScannerError::persistence(format!(
                "failed to write history file '{}'",
                self.path.display()
            ))
            .with_source(e)
        };

        self.ensure_parent_directory().map_err(write_failed)?;

        let content = serde_json::to_string_pretty(history).map_err(|e| {
            ScannerError::persistence("failed to serialize history")
                .with_source(e)
        })?;

        // Write beside the target, then swap it in.
        let temp_path = self.temp_path();
        fs::write(&temp_path, content).map_err(write_failed)?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            write_failed(e)
        })?;

        debug!("Saved {} results to {}", history.len(), self.path.display());
        Ok(())
    }
}

/// History held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    history: Mutex<Option<Vec<TestResult>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(history: Vec<TestResult>) -> Self {
        Self { history: Mutex::new(Some(history)) }
    }
}

impl DurableStore for MemoryStore {
    fn get_history(&self) -> Option<Vec<TestResult>> {
        self.history.lock().ok().and_then(|history| history.clone())
    }

    fn set_history(&self, history: &[TestResult]) -> Result<(), ScannerError> {
        let mut stored = self.history.lock().map_err(|_| {
            ScannerError::persistence("in-memory history lock poisoned")
        })?;
        *stored = Some(history.to_vec());
        Ok(())
    }
}

impl<S: DurableStore + ?Sized> DurableStore for Box<S> {
    fn get_history(&self) -> Option<Vec<TestResult>> {
        (**self).get_history()
    }

    fn set_history(&self, history: &[TestResult]) -> Result<(), ScannerError> {
        (**self).set_history(history)
    }
}

/// Default location of the history file.
///
/// `$XDG_DATA_HOME/net-scanner/history.json`, else
/// `$HOME/.local/share/net-scanner/history.json`, else a file in the
/// working directory.
pub fn default_history_path() -> PathBuf {
    let data_dir = if let Some(xdg_data) = non_empty_var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data)
    } else if let Some(home) = non_empty_var("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        return PathBuf::from(FALLBACK_FILE_NAME);
    };

    data_dir.join(env!("CARGO_PKG_NAME")).join("history.json")
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::LatencyResult;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample(download: f64) -> TestResult {
        TestResult::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            download,
            download * 0.8,
            LatencyResult::new(25.0, 3.0),
        )
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("history.json"));

        assert!(store.get_history().is_none());
    }

    #[test]
    fn test_write_then_read_preserves_order() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/history.json"));
        let history = vec![sample(50.0), sample(20.0), sample(5.0)];

        store.set_history(&history).unwrap();

        assert_eq!(store.get_history().unwrap(), history);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_malformed_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(JsonFileStore::new(&path).get_history().is_none());
    }

    #[test]
    fn test_wrong_shape_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, r#"[{"download": "fast"}]"#).unwrap();

        assert!(JsonFileStore::new(&path).get_history().is_none());
    }

    #[test]
    fn test_empty_history_is_persisted() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("history.json"));

        store.set_history(&[sample(1.0)]).unwrap();
        store.set_history(&[]).unwrap();

        assert_eq!(store.get_history(), Some(vec![]));
    }

    #[test]
    fn test_unwritable_location_is_persistence_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();
        let store = JsonFileStore::new(blocker.join("history.json"));

        let error = store.set_history(&[sample(1.0)]).unwrap_err();

        assert_eq!(error.kind, crate::errors::ErrorKind::PersistenceFailure);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(sample(10.0)).unwrap();
        let object = json.as_object().unwrap();

        for key in ["timestamp", "download", "upload", "ping", "jitter"] {
            assert!(object.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get_history().is_none());

        store.set_history(&[sample(3.0)]).unwrap();
        assert_eq!(store.get_history().unwrap().len(), 1);
    }

    #[test]
    fn test_default_path_ends_with_history_file() {
        let path = default_history_path();
        assert!(path.ends_with("net-scanner/history.json")
            || path.ends_with(FALLBACK_FILE_NAME));
    }
}
