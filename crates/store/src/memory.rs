//! In-memory store with transaction scoping.
//!
//! Each mutating engine operation runs inside [`MemoryStore::transaction`]:
//! the state is cloned up front and restored on error, so a failed operation
//! leaves no partial state behind. The `Mutex` serializes transactions, which
//! also closes the overlapping-sweep race: two sweeps cannot interleave
//! between a candidate's freshness check and its commit.

use std::sync::{Mutex, PoisonError};

use recert_core::RecertError;

use crate::repository::State;

pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_state(State::default())
    }

    pub fn from_state(state: State) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Run `f` atomically: commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut State) -> Result<T, RecertError>,
    ) -> Result<T, RecertError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let checkpoint = guard.clone();
        match f(&mut guard) {
            Ok(value) => Ok(value),
            Err(e) => {
                *guard = checkpoint;
                Err(e)
            }
        }
    }

    /// Non-mutating access to a consistent snapshot of the state.
    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        let guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
