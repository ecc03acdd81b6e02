//! Applies verdicts as single idempotent store mutations.

use crate::ports::Store;
use crate::retry::RetryPolicy;
use driftfix_types::{DivergenceVerdict, Record, RepairAction, RepairOutcome, ShardRecord, Target};
use tracing::{debug, warn};

pub struct RepairExecutor<'a> {
    store: &'a dyn Store,
    retry: RetryPolicy,
}

impl<'a> RepairExecutor<'a> {
    pub fn new(store: &'a dyn Store, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Apply one verdict. Failures are returned, never raised.
    ///
    /// `NoAction` succeeds without touching the store. An action that does not
    /// fit its record fails without a store call.
    pub fn apply(&self, verdict: &DivergenceVerdict, target: &Target) -> RepairOutcome {
        let ns = &target.namespace;
        let structure = target.structure.as_str();
        let store = self.store;
        let result = match (&verdict.action, &verdict.record) {
            (RepairAction::NoAction, _) => return RepairOutcome::Success,
            (RepairAction::DeleteOrphan, Record::Index(r)) => {
                self.retry.run("delete_index_entry", || {
                    store.delete_index_entry(ns, structure, &r.bucket, &r.id)
                })
            }
            (RepairAction::ClearShardEnd, Record::Shard(s)) => {
                let updated = ShardRecord {
                    shard_end: None,
                    ..s.clone()
                };
                self.retry.run("write_shard_metadata", || {
                    store.write_shard_metadata(ns, &updated, structure)
                })
            }
            (RepairAction::ResetCompactionFlag, Record::Shard(s)) => {
                let updated = ShardRecord {
                    compacted: false,
                    ..s.clone()
                };
                self.retry.run("write_shard_metadata", || {
                    store.write_shard_metadata(ns, &updated, structure)
                })
            }
            (RepairAction::Reinsert { canonical }, Record::Reference(r)) => {
                self.retry.run("write_reference", || {
                    store.write_reference(ns, &r.source_id, canonical)
                })
            }
            (action, record) => {
                let reason = format!("{} cannot be applied to {}", action.name(), record);
                warn!(target_key = %target, reason = reason.as_str(), "repair skipped");
                return RepairOutcome::failed(reason);
            }
        };

        match result {
            Ok(()) => {
                debug!(target_key = %target, record = %verdict.record, action = %verdict.action, "repaired");
                RepairOutcome::Success
            }
            Err(e) => RepairOutcome::failed(format!(
                "{} after {} attempt(s)",
                e.error, e.attempts
            )),
        }
    }
}
