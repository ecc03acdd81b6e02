//! Shared DTOs (schemas-as-code) for the driftfix workspace.
//!
//! # Design constraints
//! - Report and checkpoint types are serialized to disk.
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod campaign;
pub mod checkpoint;
pub mod record;
pub mod summary;
pub mod target;
pub mod verdict;

pub use campaign::{CampaignReport, CampaignTotals, ToolInfo};
pub use checkpoint::Checkpoint;
pub use record::{EntityId, IndexRecord, Page, PageCursor, Record, ReferenceRecord, ShardRecord};
pub use summary::{RunCounts, RunStatus, RunSummary};
pub use target::{Namespace, ParseEnumError, ScanMode, ShardTask, Target};
pub use verdict::{DivergenceVerdict, RepairAction, RepairOutcome};

/// Schema identifiers.
pub mod schema {
    pub const DRIFTFIX_REPORT_V1: &str = "driftfix.report.v1";
    pub const DRIFTFIX_CHECKPOINT_V1: &str = "driftfix.checkpoint.v1";
}
