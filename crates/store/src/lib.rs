pub mod memory;
pub mod repository;
pub mod snapshot;

pub use memory::MemoryStore;
pub use repository::{Repository, State};
pub use snapshot::SnapshotStore;
