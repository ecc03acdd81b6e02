//! Per-page divergence detection for each scan mode.

use crate::error::{AuditError, AuditResult};
use crate::ports::Store;
use crate::retry::RetryPolicy;
use crate::settings::{AuditSettings, OrphanWindow};
use driftfix_types::{
    DivergenceVerdict, EntityId, IndexRecord, Page, Record, ReferenceRecord, RepairAction,
    ScanMode, ShardRecord, ShardTask, Target,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// A record the classifier could not judge. It always gets `NoAction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityWarning {
    pub record: Record,
    pub reason: String,
}

/// One verdict per input record, in page order, plus any warnings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub verdicts: Vec<DivergenceVerdict>,
    pub warnings: Vec<DataQualityWarning>,
}

impl Classification {
    pub fn divergent(&self) -> impl Iterator<Item = &DivergenceVerdict> {
        self.verdicts.iter().filter(|v| v.is_divergent())
    }

    pub fn divergence_count(&self) -> usize {
        self.divergent().count()
    }

    fn push(&mut self, verdict: DivergenceVerdict) {
        self.verdicts.push(verdict);
    }

    fn warn(&mut self, record: Record, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(record = %record, reason = reason.as_str(), "data quality warning");
        self.verdicts.push(DivergenceVerdict::no_action(record.clone()));
        self.warnings.push(DataQualityWarning { record, reason });
    }
}

#[derive(Debug, Clone)]
struct CanonicalEntry {
    created: String,
    target_id: EntityId,
    duplicated: bool,
}

/// Oldest `(created, target_id)` per normalized dedup key.
#[derive(Debug, Clone, Default)]
pub struct CanonicalIndex {
    entries: BTreeMap<String, CanonicalEntry>,
}

impl CanonicalIndex {
    pub fn normalize(key: &str) -> String {
        key.trim().to_lowercase()
    }

    /// Merge one record; the smaller `(created, target_id)` wins.
    pub fn observe(&mut self, key: &str, created: &str, target_id: &EntityId) {
        match self.entries.get_mut(key) {
            None => {
                self.entries.insert(
                    key.to_string(),
                    CanonicalEntry {
                        created: created.to_string(),
                        target_id: target_id.clone(),
                        duplicated: false,
                    },
                );
            }
            Some(entry) => {
                if &entry.target_id == target_id {
                    return;
                }
                entry.duplicated = true;
                if (created, target_id) < (entry.created.as_str(), &entry.target_id) {
                    entry.created = created.to_string();
                    entry.target_id = target_id.clone();
                }
            }
        }
    }

    pub fn canonical(&self, key: &str) -> Option<&EntityId> {
        self.entries.get(key).map(|e| &e.target_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys that map to more than one distinct target.
    pub fn duplicate_keys(&self) -> impl Iterator<Item = (&str, &EntityId)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.duplicated)
            .map(|(k, e)| (k.as_str(), &e.target_id))
    }
}

/// Turns pages into verdicts for one target.
///
/// Holds the cross-page state a mode needs: the global scan position for
/// shard tasks and the canonical index for duplicate references.
pub struct DivergenceClassifier<'a> {
    store: &'a dyn Store,
    target: Target,
    retry: RetryPolicy,
    shard_task: Option<ShardTask>,
    orphan_window: Option<OrphanWindow>,
    position: u64,
    canonical: CanonicalIndex,
}

impl<'a> DivergenceClassifier<'a> {
    pub fn new(store: &'a dyn Store, target: Target, settings: &AuditSettings) -> Self {
        Self {
            store,
            target,
            retry: settings.retry.clone(),
            shard_task: settings.shard_task,
            orphan_window: settings.orphan_window,
            position: 0,
            canonical: CanonicalIndex::default(),
        }
    }

    /// Records already scanned before the first page this classifier sees.
    pub fn with_position(mut self, position: u64) -> Self {
        self.position = position;
        self
    }

    /// Global scan position of the next record.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn canonical_index(&self) -> &CanonicalIndex {
        &self.canonical
    }

    /// Read-only pass feeding the canonical index. Other modes ignore it.
    pub fn survey(&mut self, page: &Page) {
        for record in &page.records {
            if let Record::Reference(r) = record {
                if let Some((key, created)) = dedup_fields(r) {
                    self.canonical.observe(&key, created, &r.target_id);
                }
            }
        }
    }

    /// Log every key that resolved to more than one target.
    pub fn log_duplicate_groups(&self) {
        for (key, canonical) in self.canonical.duplicate_keys() {
            info!(
                target_key = %self.target,
                dedup_key = key,
                canonical = %canonical,
                "duplicate group"
            );
        }
    }

    pub fn classify(&mut self, page: &Page) -> AuditResult<Classification> {
        let mut out = Classification::default();
        match self.target.mode {
            ScanMode::OrphanIndex => self.classify_index(page, &mut out)?,
            ScanMode::ShardRepair => self.classify_shards(page, &mut out),
            ScanMode::DuplicateReference => self.classify_references(page, &mut out),
        }
        self.position += page.len() as u64;
        Ok(out)
    }

    fn classify_index(&self, page: &Page, out: &mut Classification) -> AuditResult<()> {
        let mut candidates: Vec<Option<&IndexRecord>> = Vec::with_capacity(page.len());
        let mut ids: BTreeSet<EntityId> = BTreeSet::new();
        for record in &page.records {
            match record {
                Record::Index(r) if !r.id.as_str().is_empty() && !r.bucket.is_empty() => {
                    ids.insert(r.id.clone());
                    candidates.push(Some(r));
                }
                _ => candidates.push(None),
            }
        }

        let existing = if ids.is_empty() {
            BTreeSet::new()
        } else {
            let ids: Vec<EntityId> = ids.into_iter().collect();
            let ns = &self.target.namespace;
            self.retry
                .run("lookup_entities", || self.store.lookup_entities(ns, &ids))
                .map_err(|e| AuditError::StoreUnavailable {
                    scope: self.target.key(),
                    attempts: e.attempts,
                    source: e.error,
                })?
        };

        for (record, candidate) in page.records.iter().zip(candidates) {
            let Some(r) = candidate else {
                out.warn(record.clone(), self.mismatch_reason(record, "empty id or bucket"));
                continue;
            };
            if existing.contains(&r.id) {
                out.push(DivergenceVerdict::no_action(r.clone()));
                continue;
            }
            match (self.orphan_window, r.indexed_at_ms) {
                (None, _) => {
                    out.push(DivergenceVerdict::new(r.clone(), RepairAction::DeleteOrphan));
                }
                (Some(w), Some(ts)) if w.contains(ts) => {
                    out.push(DivergenceVerdict::new(r.clone(), RepairAction::DeleteOrphan));
                }
                (Some(w), ts) => {
                    info!(
                        target_key = %self.target,
                        id = %r.id,
                        indexed_at_ms = ?ts,
                        earliest_ms = w.earliest_ms,
                        latest_ms = w.latest_ms,
                        "orphan outside age window; leaving in place"
                    );
                    out.push(DivergenceVerdict::no_action(r.clone()));
                }
            }
        }
        Ok(())
    }

    fn classify_shards(&self, page: &Page, out: &mut Classification) {
        let Some(task) = self.shard_task else {
            for record in &page.records {
                out.warn(record.clone(), "no shard repair task selected");
            }
            return;
        };
        for (offset, record) in page.records.iter().enumerate() {
            let Record::Shard(shard) = record else {
                out.warn(record.clone(), self.mismatch_reason(record, ""));
                continue;
            };
            let position = self.position + offset as u64;
            out.push(shard_verdict(task, position, shard));
        }
    }

    fn classify_references(&mut self, page: &Page, out: &mut Classification) {
        // Page-local records join the index too, so a page never judges
        // against less than it can see.
        self.survey(page);

        for record in &page.records {
            let Record::Reference(r) = record else {
                out.warn(record.clone(), self.mismatch_reason(record, ""));
                continue;
            };
            if r.source_id.as_str().is_empty() || r.target_id.as_str().is_empty() {
                out.warn(record.clone(), "empty source or target id");
                continue;
            }
            let Some((key, _)) = dedup_fields(r) else {
                let reason = if r.created.is_none() {
                    "missing created timestamp"
                } else {
                    "missing dedup key"
                };
                out.warn(record.clone(), reason);
                continue;
            };
            match self.canonical.canonical(&key) {
                Some(canonical) if canonical != &r.target_id => {
                    out.push(DivergenceVerdict::new(
                        r.clone(),
                        RepairAction::Reinsert {
                            canonical: canonical.clone(),
                        },
                    ));
                }
                _ => out.push(DivergenceVerdict::no_action(r.clone())),
            }
        }
    }

    fn mismatch_reason(&self, record: &Record, fallback: &str) -> String {
        if record.mode() != self.target.mode {
            format!("{} record in {} scan", record.mode(), self.target.mode)
        } else {
            fallback.to_string()
        }
    }
}

fn shard_verdict(task: ShardTask, position: u64, shard: &ShardRecord) -> DivergenceVerdict {
    let action = match task {
        ShardTask::RemoveLastShardEnd if position == 0 => RepairAction::ClearShardEnd,
        ShardTask::RemoveLastShardEnd => RepairAction::NoAction,
        ShardTask::RemoveAllShardEnds => RepairAction::ClearShardEnd,
        ShardTask::ResetAllCompactionStatus => RepairAction::ResetCompactionFlag,
    };
    DivergenceVerdict::new(shard.clone(), action)
}

/// Normalized key and creation time, when both are usable.
///
/// References with an empty source or target never take part in grouping.
fn dedup_fields(r: &ReferenceRecord) -> Option<(String, &str)> {
    if r.source_id.as_str().is_empty() || r.target_id.as_str().is_empty() {
        return None;
    }
    let key = CanonicalIndex::normalize(r.dedup_key.as_deref()?);
    if key.is_empty() {
        return None;
    }
    let created = r.created.as_deref()?;
    Some((key, created))
}
