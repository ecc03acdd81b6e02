//! Port traits abstracting all store I/O away from the engine.

use crate::error::StoreError;
use driftfix_types::{
    Checkpoint, EntityId, IndexRecord, Namespace, Page, PageCursor, ReferenceRecord, ScanMode,
    ShardRecord, Target,
};
use std::collections::BTreeSet;

/// Secondary index access plus the authoritative existence check.
pub trait IndexPort {
    /// One page of index entries, starting after `cursor`.
    fn fetch_index_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<IndexRecord>, StoreError>;

    /// The subset of `ids` that exist in primary storage.
    fn lookup_entities(
        &self,
        namespace: &Namespace,
        ids: &[EntityId],
    ) -> Result<BTreeSet<EntityId>, StoreError>;

    /// Remove one index entry. Removing an absent entry succeeds.
    fn delete_index_entry(
        &self,
        namespace: &Namespace,
        collection: &str,
        bucket: &str,
        id: &EntityId,
    ) -> Result<(), StoreError>;
}

/// Directed-edge shard metadata.
pub trait ShardPort {
    /// One page of the chain in the store's natural scan order.
    fn fetch_shard_page(
        &self,
        namespace: &Namespace,
        edge_meta: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ShardRecord>, StoreError>;

    /// Overwrite the row for `shard.shard_id`.
    fn write_shard_metadata(
        &self,
        namespace: &Namespace,
        shard: &ShardRecord,
        edge_meta: &str,
    ) -> Result<(), StoreError>;
}

/// Cross-references between entities.
pub trait ReferencePort {
    fn fetch_reference_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ReferenceRecord>, StoreError>;

    /// Upsert keyed by `(source, target)`; writing an existing link is a no-op.
    fn write_reference(
        &self,
        namespace: &Namespace,
        source: &EntityId,
        target: &EntityId,
    ) -> Result<(), StoreError>;
}

/// Enumerates what can be scanned.
pub trait CatalogPort {
    fn list_namespaces(&self) -> Result<BTreeSet<Namespace>, StoreError>;

    /// Collections for index and reference modes, edge-meta chains for shard mode.
    fn list_structures(
        &self,
        namespace: &Namespace,
        mode: ScanMode,
    ) -> Result<BTreeSet<String>, StoreError>;
}

/// Everything the engine needs from a store.
pub trait Store: IndexPort + ShardPort + ReferencePort + CatalogPort + Send + Sync {}

impl<T> Store for T where T: IndexPort + ShardPort + ReferencePort + CatalogPort + Send + Sync {}

/// Durable per-target resume points.
pub trait CheckpointPort: Send + Sync {
    fn load(&self, target: &Target) -> anyhow::Result<Option<Checkpoint>>;
    fn save(&self, checkpoint: &Checkpoint) -> anyhow::Result<()>;
    fn clear(&self, target: &Target) -> anyhow::Result<()>;
}
