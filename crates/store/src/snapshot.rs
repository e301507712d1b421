//! Filesystem snapshot persistence for the in-memory store.
//!
//! Manages the `data/` directory:
//! ```text
//! data/
//!   state.json    <- complete store state, pretty-printed
//! ```

use std::path::{Path, PathBuf};

use recert_core::RecertError;

use crate::repository::State;

const STATE_FILE: &str = "state.json";

pub struct SnapshotStore {
    base_dir: PathBuf,
}

impl SnapshotStore {
    /// Create a new SnapshotStore, ensuring the directory exists.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, RecertError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Persist the full state as `state.json`.
    pub fn save(&self, state: &State) -> Result<(), RecertError> {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(self.base_dir.join(STATE_FILE), json)?;
        Ok(())
    }

    /// Load the state from `state.json`, or `None` if no snapshot exists yet.
    pub fn load(&self) -> Result<Option<State>, RecertError> {
        let path = self.base_dir.join(STATE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        let state = serde_json::from_str(&json)?;
        Ok(Some(state))
    }
}
