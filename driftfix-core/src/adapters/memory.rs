//! In-process store for embedding and testing.

use crate::error::StoreError;
use crate::ports::{CatalogPort, IndexPort, ReferencePort, ShardPort};
use driftfix_types::{
    EntityId, IndexRecord, Namespace, Page, PageCursor, ReferenceRecord, ScanMode, ShardRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Full contents of a store; also the on-disk snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub namespaces: BTreeMap<Namespace, NamespaceData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceData {
    /// Authoritative primary entities.
    pub entities: BTreeSet<EntityId>,
    pub collections: BTreeMap<String, CollectionData>,
    /// Shard rows per edge-meta chain.
    pub shard_chains: BTreeMap<String, Vec<ShardRecord>>,
    /// Canonical `(source, target)` reference rows written by upserts.
    pub links: BTreeSet<(EntityId, EntityId)>,
    /// Every mutation in a read-only namespace is rejected.
    pub read_only: bool,
    /// Reads and structure listings in an offline namespace are unavailable.
    pub offline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionData {
    pub index: Vec<IndexRecord>,
    pub references: Vec<ReferenceRecord>,
}

/// Thread-safe in-memory implementation of every store port.
///
/// Scan order:
/// - index entries ascending by `(bucket, id)`
/// - shard chains descending by `shard_id` (newest shard first)
/// - references ascending by `(source_id, target_id)`
///
/// Cursors are the key of the last returned row, so deletes made while a scan
/// is in progress never shift later pages.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
    mutations: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(mut snapshot: StoreSnapshot) -> Self {
        for ns in snapshot.namespaces.values_mut() {
            for coll in ns.collections.values_mut() {
                coll.index.sort_by(|a, b| index_key(a).cmp(&index_key(b)));
                coll.index.dedup_by(|a, b| index_key(a) == index_key(b));
                coll.references
                    .sort_by(|a, b| reference_key(a).cmp(&reference_key(b)));
            }
            for chain in ns.shard_chains.values_mut() {
                chain.sort_by(|a, b| b.shard_id.cmp(&a.shard_id));
                chain.dedup_by_key(|s| s.shard_id);
            }
        }
        Self {
            state: Mutex::new(snapshot),
            mutations: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.lock().clone()
    }

    /// Number of successful mutating calls served so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn add_namespace(&self, namespace: impl Into<Namespace>) {
        self.lock().namespaces.entry(namespace.into()).or_default();
    }

    pub fn set_read_only(&self, namespace: impl Into<Namespace>, read_only: bool) {
        let mut state = self.lock();
        state.namespaces.entry(namespace.into()).or_default().read_only = read_only;
    }

    pub fn set_offline(&self, namespace: impl Into<Namespace>, offline: bool) {
        let mut state = self.lock();
        state.namespaces.entry(namespace.into()).or_default().offline = offline;
    }

    pub fn insert_entity(&self, namespace: impl Into<Namespace>, id: impl Into<EntityId>) {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.into()).or_default();
        ns.entities.insert(id.into());
    }

    pub fn insert_index_entry(
        &self,
        namespace: impl Into<Namespace>,
        collection: &str,
        record: IndexRecord,
    ) {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.into()).or_default();
        let coll = ns.collections.entry(collection.to_string()).or_default();
        let key = index_key(&record);
        match coll.index.binary_search_by(|r| index_key(r).cmp(&key)) {
            Ok(pos) => coll.index[pos] = record,
            Err(pos) => coll.index.insert(pos, record),
        }
    }

    pub fn insert_shard(&self, namespace: impl Into<Namespace>, edge_meta: &str, shard: ShardRecord) {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.into()).or_default();
        upsert_shard(ns.shard_chains.entry(edge_meta.to_string()).or_default(), shard);
    }

    pub fn insert_reference(
        &self,
        namespace: impl Into<Namespace>,
        collection: &str,
        record: ReferenceRecord,
    ) {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.into()).or_default();
        let coll = ns.collections.entry(collection.to_string()).or_default();
        let key = reference_key(&record);
        match coll.references.binary_search_by(|r| reference_key(r).cmp(&key)) {
            Ok(pos) => coll.references[pos] = record,
            Err(pos) => coll.references.insert(pos, record),
        }
    }

    pub fn index_entries(&self, namespace: &Namespace, collection: &str) -> Vec<IndexRecord> {
        self.lock()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.collections.get(collection))
            .map(|c| c.index.clone())
            .unwrap_or_default()
    }

    pub fn shards(&self, namespace: &Namespace, edge_meta: &str) -> Vec<ShardRecord> {
        self.lock()
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.shard_chains.get(edge_meta))
            .cloned()
            .unwrap_or_default()
    }

    pub fn links(&self, namespace: &Namespace) -> BTreeSet<(EntityId, EntityId)> {
        self.lock()
            .namespaces
            .get(namespace)
            .map(|ns| ns.links.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreSnapshot> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

fn index_key(r: &IndexRecord) -> (String, EntityId) {
    (r.bucket.clone(), r.id.clone())
}

fn reference_key(r: &ReferenceRecord) -> (EntityId, EntityId) {
    (r.source_id.clone(), r.target_id.clone())
}

fn upsert_shard(chain: &mut Vec<ShardRecord>, shard: ShardRecord) {
    // Chain is kept in descending shard_id order.
    match chain.binary_search_by(|s| shard.shard_id.cmp(&s.shard_id)) {
        Ok(pos) => chain[pos] = shard,
        Err(pos) => chain.insert(pos, shard),
    }
}

fn check_writable(ns: &NamespaceData, namespace: &Namespace) -> Result<(), StoreError> {
    if ns.read_only {
        return Err(StoreError::rejected(format!(
            "namespace '{}' is read-only",
            namespace
        )));
    }
    Ok(())
}

fn readable<'s>(
    state: &'s StoreSnapshot,
    namespace: &Namespace,
) -> Result<Option<&'s NamespaceData>, StoreError> {
    match state.namespaces.get(namespace) {
        Some(ns) if ns.offline => Err(StoreError::unavailable(format!(
            "namespace '{}' is offline",
            namespace
        ))),
        ns => Ok(ns),
    }
}

fn encode_cursor<K: Serialize>(key: &K) -> Result<PageCursor, StoreError> {
    serde_json::to_string(key)
        .map(PageCursor::new)
        .map_err(|e| StoreError::rejected(format!("encode cursor: {}", e)))
}

fn decode_cursor<K: for<'de> Deserialize<'de>>(cursor: &PageCursor) -> Result<K, StoreError> {
    serde_json::from_str(cursor.as_str())
        .map_err(|_| StoreError::rejected(format!("malformed cursor '{}'", cursor)))
}

/// Rows strictly after `after` (in slice order), at most `page_size` of them.
fn page_after<T: Clone, K: Ord + Serialize>(
    rows: &[T],
    key: impl Fn(&T) -> K,
    after: Option<K>,
    page_size: usize,
    descending: bool,
) -> Result<Page<T>, StoreError> {
    let start = match after {
        None => 0,
        Some(after) => rows.partition_point(|r| {
            let k = key(r);
            if descending { k >= after } else { k <= after }
        }),
    };
    let end = (start + page_size).min(rows.len());
    let records = rows[start..end].to_vec();
    let cursor = if end < rows.len() {
        match records.last() {
            Some(last) => Some(encode_cursor(&key(last))?),
            None => None,
        }
    } else {
        None
    };
    Ok(Page::new(records, cursor))
}

impl IndexPort for MemoryStore {
    fn fetch_index_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<IndexRecord>, StoreError> {
        let after: Option<(String, EntityId)> = cursor.map(decode_cursor).transpose()?;
        let state = self.lock();
        let rows = readable(&state, namespace)?
            .and_then(|ns| ns.collections.get(collection))
            .map(|c| c.index.as_slice())
            .unwrap_or_default();
        page_after(rows, index_key, after, page_size, false)
    }

    fn lookup_entities(
        &self,
        namespace: &Namespace,
        ids: &[EntityId],
    ) -> Result<BTreeSet<EntityId>, StoreError> {
        let state = self.lock();
        let Some(ns) = readable(&state, namespace)? else {
            return Ok(BTreeSet::new());
        };
        Ok(ids
            .iter()
            .filter(|id| ns.entities.contains(*id))
            .cloned()
            .collect())
    }

    fn delete_index_entry(
        &self,
        namespace: &Namespace,
        collection: &str,
        bucket: &str,
        id: &EntityId,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(ns) = state.namespaces.get_mut(namespace) {
            check_writable(ns, namespace)?;
            if let Some(coll) = ns.collections.get_mut(collection) {
                coll.index.retain(|r| !(r.bucket == bucket && &r.id == id));
            }
        }
        drop(state);
        self.bump();
        Ok(())
    }
}

impl ShardPort for MemoryStore {
    fn fetch_shard_page(
        &self,
        namespace: &Namespace,
        edge_meta: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ShardRecord>, StoreError> {
        let after: Option<i64> = cursor.map(decode_cursor).transpose()?;
        let state = self.lock();
        let rows = readable(&state, namespace)?
            .and_then(|ns| ns.shard_chains.get(edge_meta))
            .map(|c| c.as_slice())
            .unwrap_or_default();
        page_after(rows, |s| s.shard_id, after, page_size, true)
    }

    fn write_shard_metadata(
        &self,
        namespace: &Namespace,
        shard: &ShardRecord,
        edge_meta: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.clone()).or_default();
        check_writable(ns, namespace)?;
        upsert_shard(
            ns.shard_chains.entry(edge_meta.to_string()).or_default(),
            shard.clone(),
        );
        drop(state);
        self.bump();
        Ok(())
    }
}

impl ReferencePort for MemoryStore {
    fn fetch_reference_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ReferenceRecord>, StoreError> {
        let after: Option<(EntityId, EntityId)> = cursor.map(decode_cursor).transpose()?;
        let state = self.lock();
        let rows = readable(&state, namespace)?
            .and_then(|ns| ns.collections.get(collection))
            .map(|c| c.references.as_slice())
            .unwrap_or_default();
        page_after(rows, reference_key, after, page_size, false)
    }

    fn write_reference(
        &self,
        namespace: &Namespace,
        source: &EntityId,
        target: &EntityId,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let ns = state.namespaces.entry(namespace.clone()).or_default();
        check_writable(ns, namespace)?;
        ns.links.insert((source.clone(), target.clone()));
        drop(state);
        self.bump();
        Ok(())
    }
}

impl CatalogPort for MemoryStore {
    fn list_namespaces(&self) -> Result<BTreeSet<Namespace>, StoreError> {
        Ok(self.lock().namespaces.keys().cloned().collect())
    }

    fn list_structures(
        &self,
        namespace: &Namespace,
        mode: ScanMode,
    ) -> Result<BTreeSet<String>, StoreError> {
        let state = self.lock();
        let Some(ns) = readable(&state, namespace)? else {
            return Ok(BTreeSet::new());
        };
        // Collections stay listed after a repair empties them.
        let names = match mode {
            ScanMode::OrphanIndex | ScanMode::DuplicateReference => {
                ns.collections.keys().cloned().collect()
            }
            ScanMode::ShardRepair => ns.shard_chains.keys().cloned().collect(),
        };
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ns() -> Namespace {
        Namespace::new("app")
    }

    fn store_with_index(n: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..n {
            store.insert_index_entry("app", "users", IndexRecord::new(format!("e{:02}", i).as_str(), "0"));
        }
        store
    }

    #[test]
    fn index_pages_walk_whole_collection_once() {
        let store = store_with_index(5);
        let p1 = store.fetch_index_page(&ns(), "users", None, 2).unwrap();
        assert_eq!(p1.len(), 2);
        assert!(p1.cursor.is_some());

        let p2 = store
            .fetch_index_page(&ns(), "users", p1.cursor.as_ref(), 2)
            .unwrap();
        let p3 = store
            .fetch_index_page(&ns(), "users", p2.cursor.as_ref(), 2)
            .unwrap();
        assert_eq!(p3.len(), 1);
        assert!(p3.cursor.is_none());

        let ids: Vec<String> = [p1, p2, p3]
            .into_iter()
            .flat_map(|p| p.records)
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, vec!["e00", "e01", "e02", "e03", "e04"]);
    }

    #[test]
    fn exact_multiple_has_no_trailing_cursor() {
        let store = store_with_index(4);
        let p1 = store.fetch_index_page(&ns(), "users", None, 2).unwrap();
        let p2 = store
            .fetch_index_page(&ns(), "users", p1.cursor.as_ref(), 2)
            .unwrap();
        assert_eq!(p2.len(), 2);
        assert!(p2.cursor.is_none());
    }

    #[test]
    fn deletes_during_scan_do_not_shift_pages() {
        let store = store_with_index(4);
        let p1 = store.fetch_index_page(&ns(), "users", None, 2).unwrap();
        for r in &p1.records {
            store
                .delete_index_entry(&ns(), "users", &r.bucket, &r.id)
                .unwrap();
        }
        let p2 = store
            .fetch_index_page(&ns(), "users", p1.cursor.as_ref(), 2)
            .unwrap();
        let ids: Vec<&str> = p2.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e02", "e03"]);
    }

    #[test]
    fn shard_chain_scans_newest_first() {
        let store = MemoryStore::new();
        for id in [10, 30, 20] {
            store.insert_shard(
                "app",
                "chain",
                ShardRecord {
                    shard_id: id,
                    shard_end: Some(format!("end-{}", id)),
                    compacted: true,
                },
            );
        }
        let p1 = store.fetch_shard_page(&ns(), "chain", None, 2).unwrap();
        assert_eq!(
            p1.records.iter().map(|s| s.shard_id).collect::<Vec<_>>(),
            vec![30, 20]
        );
        let p2 = store
            .fetch_shard_page(&ns(), "chain", p1.cursor.as_ref(), 2)
            .unwrap();
        assert_eq!(
            p2.records.iter().map(|s| s.shard_id).collect::<Vec<_>>(),
            vec![10]
        );
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        let store = store_with_index(1);
        let err = store
            .fetch_index_page(&ns(), "users", Some(&PageCursor::new("not json")), 2)
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn lookup_returns_existing_subset() {
        let store = MemoryStore::new();
        store.insert_entity("app", "a");
        store.insert_entity("app", "c");
        let found = store
            .lookup_entities(&ns(), &["a".into(), "b".into(), "c".into()])
            .unwrap();
        assert_eq!(
            found,
            ["a", "c"].into_iter().map(EntityId::from).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn read_only_namespace_rejects_writes() {
        let store = store_with_index(1);
        store.set_read_only("app", true);
        let err = store
            .delete_index_entry(&ns(), "users", "0", &EntityId::from("e00"))
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(store.index_entries(&ns(), "users").len(), 1);
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn offline_namespace_reads_are_unavailable() {
        let store = store_with_index(2);
        store.set_offline("app", true);
        let err = store.fetch_index_page(&ns(), "users", None, 10).unwrap_err();
        assert!(err.is_retryable());
        assert!(store.lookup_entities(&ns(), &[EntityId::from("e00")]).is_err());
        assert!(store.list_structures(&ns(), ScanMode::OrphanIndex).is_err());
        assert!(store.list_namespaces().unwrap().contains(&ns()));

        store.set_offline("app", false);
        assert_eq!(store.fetch_index_page(&ns(), "users", None, 10).unwrap().records.len(), 2);
    }

    #[test]
    fn catalog_lists_structures_per_mode() {
        let store = store_with_index(1);
        store.insert_shard(
            "app",
            "chain",
            ShardRecord {
                shard_id: 1,
                shard_end: None,
                compacted: false,
            },
        );
        store.add_namespace("empty");

        let namespaces = store.list_namespaces().unwrap();
        assert_eq!(namespaces.len(), 2);
        assert!(
            store
                .list_structures(&ns(), ScanMode::OrphanIndex)
                .unwrap()
                .contains("users")
        );
        assert!(
            store
                .list_structures(&ns(), ScanMode::DuplicateReference)
                .unwrap()
                .contains("users")
        );
        assert!(
            store
                .list_structures(&ns(), ScanMode::ShardRepair)
                .unwrap()
                .contains("chain")
        );
    }
}
