//! Port implementations shipped with the engine.
//!
//! - [`MemoryStore`]: every store port, in process
//! - [`load_snapshot`] / [`save_snapshot`]: JSON files backing a `MemoryStore`
//! - [`FaultInjectingStore`]: wraps a store and fails selected calls
//! - [`FsCheckpointStore`] / [`MemoryCheckpointStore`]: checkpoint persistence

mod checkpoints;
mod faults;
mod memory;
mod snapshot;

pub use checkpoints::{FsCheckpointStore, MemoryCheckpointStore};
pub use faults::FaultInjectingStore;
pub use memory::{CollectionData, MemoryStore, NamespaceData, StoreSnapshot};
pub use snapshot::{load_snapshot, save_snapshot};
