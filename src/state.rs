// ABOUTME: Run-state persistence - records the last successful run and the
// ABOUTME: insert-pending marker that fences the partial-apply window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Marker set after the close-out update has been applied but before the
/// insert step completes. While this is present on disk, the warehouse may
/// be in an inconsistent intermediate state and the pipeline refuses to
/// start a new run until an operator acknowledges it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertPending {
    /// When the mutation phase began
    pub started_at: DateTime<Utc>,
    /// Whether the update step actually executed (vs. was skipped)
    pub update_applied: bool,
    /// Number of keys the update step closed out
    pub keys_closed: usize,
}

/// Persistent pipeline state, stored as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    /// Version of the state format for future migrations
    #[serde(default)]
    pub version: u32,
    /// Completion time of the last fully successful run
    pub last_success_at: Option<DateTime<Utc>>,
    /// Rows inserted by the last successful run
    #[serde(default)]
    pub last_inserted: u64,
    /// Rows closed out by the last successful run
    #[serde(default)]
    pub last_closed: u64,
    /// Set while a mutation phase is in flight or failed mid-way
    pub insert_pending: Option<InsertPending>,
}

impl RunState {
    /// Load state from a JSON file, or default state if the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(RunState {
                version: 1,
                ..Default::default()
            });
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::State(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&contents)
            .map_err(|e| SyncError::State(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Save state to a JSON file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::State(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| SyncError::State(format!("Failed to serialize state: {}", e)))?;
        std::fs::write(path, contents)
            .map_err(|e| SyncError::State(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Mark the start of the mutation phase.
    pub fn mark_insert_pending(&mut self, update_applied: bool, keys_closed: usize) {
        self.insert_pending = Some(InsertPending {
            started_at: Utc::now(),
            update_applied,
            keys_closed,
        });
    }

    /// Clear the marker and record a completed run.
    pub fn record_success(&mut self, inserted: u64, closed: u64) {
        self.insert_pending = None;
        self.last_success_at = Some(Utc::now());
        self.last_inserted = inserted;
        self.last_closed = closed;
    }

    /// Clear a stale insert-pending marker without recording a run.
    pub fn acknowledge_partial(&mut self) -> Option<InsertPending> {
        self.insert_pending.take()
    }

    /// Default state file location under the user's home directory.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".dimension-sync")
            .join("state.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let state = RunState::load(&dir.path().join("state.json")).unwrap();
        assert_eq!(state.version, 1);
        assert!(state.insert_pending.is_none());
        assert!(state.last_success_at.is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut state = RunState {
            version: 1,
            ..Default::default()
        };
        state.mark_insert_pending(true, 3);
        state.save(&path).unwrap();

        let loaded = RunState::load(&path).unwrap();
        let pending = loaded.insert_pending.expect("marker should persist");
        assert!(pending.update_applied);
        assert_eq!(pending.keys_closed, 3);
    }

    #[test]
    fn test_record_success_clears_marker() {
        let mut state = RunState::default();
        state.mark_insert_pending(true, 2);
        state.record_success(10, 2);
        assert!(state.insert_pending.is_none());
        assert!(state.last_success_at.is_some());
        assert_eq!(state.last_inserted, 10);
        assert_eq!(state.last_closed, 2);
    }

    #[test]
    fn test_acknowledge_partial_takes_marker() {
        let mut state = RunState::default();
        state.mark_insert_pending(false, 0);
        let taken = state.acknowledge_partial();
        assert!(taken.is_some());
        assert!(state.insert_pending.is_none());
        assert!(state.acknowledge_partial().is_none());
    }

    #[test]
    fn test_corrupt_state_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RunState::load(&path),
            Err(SyncError::State(_))
        ));
    }
}
