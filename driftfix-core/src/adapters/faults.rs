//! A store wrapper that injects failures into selected calls.
//!
//! `FaultInjectingStore` wraps any [`Store`](crate::ports::Store) and fails
//! configured calls before they reach the inner store. Used for exercising
//! retry, interruption and partial-failure paths.
//!
//! ```ignore
//! let store = FaultInjectingStore::new(inner)
//!     .transient_fetch_failures(2)   // first two fetches time out
//!     .fail_writes_for("u7");        // every write touching u7 is rejected
//! ```

use crate::error::StoreError;
use crate::ports::{CatalogPort, IndexPort, ReferencePort, ShardPort};
use driftfix_types::{
    EntityId, IndexRecord, Namespace, Page, PageCursor, ReferenceRecord, ScanMode, ShardRecord,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct FaultInjectingStore<S> {
    inner: S,
    transient_fetches: u64,
    fail_fetches_from: Option<u64>,
    fail_lookups: bool,
    fail_writes_for: BTreeSet<String>,
    fail_catalog_for: BTreeSet<Namespace>,
    fail_namespace_listing: bool,
    fetch_calls: AtomicU64,
    lookup_calls: AtomicU64,
    write_calls: AtomicU64,
}

impl<S> FaultInjectingStore<S> {
    /// Wrap `inner` with no faults configured (pass-through).
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            transient_fetches: 0,
            fail_fetches_from: None,
            fail_lookups: false,
            fail_writes_for: BTreeSet::new(),
            fail_catalog_for: BTreeSet::new(),
            fail_namespace_listing: false,
            fetch_calls: AtomicU64::new(0),
            lookup_calls: AtomicU64::new(0),
            write_calls: AtomicU64::new(0),
        }
    }

    /// The first `count` page fetches fail with a retryable error.
    pub fn transient_fetch_failures(mut self, count: u64) -> Self {
        self.transient_fetches = count;
        self
    }

    /// Every page fetch from call number `call` (1-based) onwards fails.
    pub fn fail_fetches_from(mut self, call: u64) -> Self {
        self.fail_fetches_from = Some(call);
        self
    }

    pub fn fail_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    /// Reject writes for an entity id, or a shard id in decimal form.
    pub fn fail_writes_for(mut self, id: impl Into<String>) -> Self {
        self.fail_writes_for.insert(id.into());
        self
    }

    pub fn fail_catalog_for(mut self, namespace: impl Into<Namespace>) -> Self {
        self.fail_catalog_for.insert(namespace.into());
        self
    }

    pub fn fail_namespace_listing(mut self) -> Self {
        self.fail_namespace_listing = true;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> u64 {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Write attempts, including rejected ones.
    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn before_fetch(&self) -> Result<(), StoreError> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.transient_fetches {
            return Err(StoreError::unavailable(format!(
                "injected timeout on fetch {}",
                call
            )));
        }
        if matches!(self.fail_fetches_from, Some(from) if call >= from) {
            return Err(StoreError::unavailable(format!(
                "injected outage on fetch {}",
                call
            )));
        }
        Ok(())
    }

    fn before_write(&self, id: &str) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes_for.contains(id) {
            return Err(StoreError::rejected(format!("injected write failure for {}", id)));
        }
        Ok(())
    }
}

impl<S: IndexPort> IndexPort for FaultInjectingStore<S> {
    fn fetch_index_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<IndexRecord>, StoreError> {
        self.before_fetch()?;
        self.inner
            .fetch_index_page(namespace, collection, cursor, page_size)
    }

    fn lookup_entities(
        &self,
        namespace: &Namespace,
        ids: &[EntityId],
    ) -> Result<BTreeSet<EntityId>, StoreError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(StoreError::unavailable("injected lookup outage"));
        }
        self.inner.lookup_entities(namespace, ids)
    }

    fn delete_index_entry(
        &self,
        namespace: &Namespace,
        collection: &str,
        bucket: &str,
        id: &EntityId,
    ) -> Result<(), StoreError> {
        self.before_write(id.as_str())?;
        self.inner
            .delete_index_entry(namespace, collection, bucket, id)
    }
}

impl<S: ShardPort> ShardPort for FaultInjectingStore<S> {
    fn fetch_shard_page(
        &self,
        namespace: &Namespace,
        edge_meta: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ShardRecord>, StoreError> {
        self.before_fetch()?;
        self.inner
            .fetch_shard_page(namespace, edge_meta, cursor, page_size)
    }

    fn write_shard_metadata(
        &self,
        namespace: &Namespace,
        shard: &ShardRecord,
        edge_meta: &str,
    ) -> Result<(), StoreError> {
        self.before_write(&shard.shard_id.to_string())?;
        self.inner.write_shard_metadata(namespace, shard, edge_meta)
    }
}

impl<S: ReferencePort> ReferencePort for FaultInjectingStore<S> {
    fn fetch_reference_page(
        &self,
        namespace: &Namespace,
        collection: &str,
        cursor: Option<&PageCursor>,
        page_size: usize,
    ) -> Result<Page<ReferenceRecord>, StoreError> {
        self.before_fetch()?;
        self.inner
            .fetch_reference_page(namespace, collection, cursor, page_size)
    }

    fn write_reference(
        &self,
        namespace: &Namespace,
        source: &EntityId,
        target: &EntityId,
    ) -> Result<(), StoreError> {
        self.before_write(source.as_str())?;
        self.inner.write_reference(namespace, source, target)
    }
}

impl<S: CatalogPort> CatalogPort for FaultInjectingStore<S> {
    fn list_namespaces(&self) -> Result<BTreeSet<Namespace>, StoreError> {
        if self.fail_namespace_listing {
            return Err(StoreError::unavailable("injected catalog outage"));
        }
        self.inner.list_namespaces()
    }

    fn list_structures(
        &self,
        namespace: &Namespace,
        mode: ScanMode,
    ) -> Result<BTreeSet<String>, StoreError> {
        if self.fail_catalog_for.contains(namespace) {
            return Err(StoreError::unavailable(format!(
                "injected catalog outage for {}",
                namespace
            )));
        }
        self.inner.list_structures(namespace, mode)
    }
}
