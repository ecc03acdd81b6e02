use crate::record::PageCursor;
use crate::target::Target;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Counters accumulated while scanning one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pages_scanned: u64,
    pub records_scanned: u64,
    pub divergences_found: u64,
    pub repairs_applied: u64,
    pub repairs_failed: u64,

    /// Divergences deliberately not repaired (dry-run or report-only).
    #[serde(default)]
    pub repairs_skipped: u64,

    #[serde(default)]
    pub data_quality_warnings: u64,
}

impl RunCounts {
    /// `applied + failed <= divergences <= scanned`.
    pub fn is_consistent(&self) -> bool {
        self.repairs_applied + self.repairs_failed + self.repairs_skipped <= self.divergences_found
            && self.divergences_found <= self.records_scanned
    }
}

impl AddAssign for RunCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.pages_scanned += rhs.pages_scanned;
        self.records_scanned += rhs.records_scanned;
        self.divergences_found += rhs.divergences_found;
        self.repairs_applied += rhs.repairs_applied;
        self.repairs_failed += rhs.repairs_failed;
        self.repairs_skipped += rhs.repairs_skipped;
        self.data_quality_warnings += rhs.data_quality_warnings;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The whole target was scanned.
    Completed,
    /// Stopped at the configured page budget; resumable from `next_cursor`.
    Paused,
    /// Stopped by an operator interrupt after finishing a page.
    Interrupted,
    /// A fetch or lookup exhausted its retries.
    Failed,
}

/// Final report for one target. Never mutated after the run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub target: Target,
    pub status: RunStatus,

    #[serde(flatten)]
    pub counts: RunCounts,

    pub duration_ms: u64,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<PageCursor>,

    /// Where a later run should resume; absent once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<PageCursor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunSummary {
    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Repairs that were attempted and did not succeed.
    pub fn has_unresolved_failures(&self) -> bool {
        self.counts.repairs_failed > 0
    }
}
