use crate::record::{EntityId, Record};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Corrective action attached to one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RepairAction {
    /// Remove the index entry; its primary entity is gone.
    DeleteOrphan,
    /// Rewrite the shard row with its boundary cleared.
    ClearShardEnd,
    /// Rewrite the shard row with `compacted = false`.
    ResetCompactionFlag,
    /// Upsert a reference from the record's source to the canonical target.
    Reinsert { canonical: EntityId },
    NoAction,
}

impl RepairAction {
    pub fn is_no_action(&self) -> bool {
        matches!(self, RepairAction::NoAction)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RepairAction::DeleteOrphan => "delete_orphan",
            RepairAction::ClearShardEnd => "clear_shard_end",
            RepairAction::ResetCompactionFlag => "reset_compaction_flag",
            RepairAction::Reinsert { .. } => "reinsert",
            RepairAction::NoAction => "no_action",
        }
    }
}

impl fmt::Display for RepairAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairAction::Reinsert { canonical } => write!(f, "reinsert -> {}", canonical),
            other => f.write_str(other.name()),
        }
    }
}

/// Classification result for one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceVerdict {
    pub record: Record,
    #[serde(flatten)]
    pub action: RepairAction,
}

impl DivergenceVerdict {
    pub fn new(record: impl Into<Record>, action: RepairAction) -> Self {
        Self {
            record: record.into(),
            action,
        }
    }

    pub fn no_action(record: impl Into<Record>) -> Self {
        Self::new(record, RepairAction::NoAction)
    }

    pub fn is_divergent(&self) -> bool {
        !self.action.is_no_action()
    }
}

/// Result of applying one verdict to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepairOutcome {
    Success,
    Failed { reason: String },
}

impl RepairOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        RepairOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RepairOutcome::Success)
    }
}
