use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CursorState {
    last_update_id: i64,
}

/// Durable checkpoint for the last consumed update id. Every failure mode is
/// downgraded to "no cursor" (load) or a logged warning (store); the poller
/// re-reads old updates rather than dying over a state file.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Option<i64> {
        if !self.path.exists() {
            debug!("state file {} does not exist", self.path.display());
            return None;
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("could not read state file {}: {err}", self.path.display());
                return None;
            }
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        match serde_json::from_str::<CursorState>(raw) {
            Ok(state) => Some(state.last_update_id),
            Err(err) => {
                warn!(
                    "state file {} does not hold a valid last_update_id: {err}",
                    self.path.display()
                );
                None
            }
        }
    }

    pub fn store(&self, last_update_id: i64) {
        if let Err(err) = self.try_store(last_update_id) {
            warn!(
                "could not write state file {}: {err:#}",
                self.path.display()
            );
        }
    }

    fn try_store(&self, last_update_id: i64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let payload = serde_json::to_string(&CursorState { last_update_id })?;
        fs::write(&self.path, payload)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state.json"));

        store.store(4242);
        assert_eq!(store.load(), Some(4242));
    }

    #[test]
    fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("nope.json"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_empty_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "  \n").unwrap();

        assert_eq!(CursorStore::new(path).load(), None);
    }

    #[test]
    fn test_malformed_json_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert_eq!(CursorStore::new(path).load(), None);
    }

    #[test]
    fn test_non_integer_cursor_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"last_update_id": "57"}"#).unwrap();

        assert_eq!(CursorStore::new(path).load(), None);
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("nested/deeper/state.json"));

        store.store(7);
        assert_eq!(store.load(), Some(7));
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = CursorStore::new(dir.path().join("state.json"));

        store.store(1);
        store.store(9);
        assert_eq!(store.load(), Some(9));
    }
}
