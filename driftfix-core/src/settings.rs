//! Clap-free settings for audit runs and campaigns.

use crate::error::{AuditError, AuditResult};
use crate::retry::RetryPolicy;
use driftfix_types::{PageCursor, ScanMode, ShardTask};

/// Default page size; the store may return fewer.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Orphans younger than this are left alone by default when a window is requested.
pub const DEFAULT_SECONDS_IN_PAST: i64 = 60 * 60;

/// Only index entries written inside `[earliest_ms, latest_ms]` may be deleted as orphans.
///
/// Guards against deleting entries whose primary write has not landed yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanWindow {
    pub earliest_ms: i64,
    pub latest_ms: i64,
}

impl OrphanWindow {
    /// Everything from the epoch up to `seconds` before `now_ms`.
    pub fn older_than(now_ms: i64, seconds: i64) -> Self {
        Self {
            earliest_ms: 0,
            latest_ms: now_ms - seconds * 1000,
        }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        ts_ms >= self.earliest_ms && ts_ms <= self.latest_ms
    }
}

/// Settings shared by every runner in a campaign.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub page_size: usize,

    /// Classify and log verdicts without invoking the executor.
    pub dry_run: bool,

    /// Required in shard-repair mode, rejected elsewhere.
    pub shard_task: Option<ShardTask>,

    pub orphan_window: Option<OrphanWindow>,

    /// Apply `Reinsert` verdicts; duplicates are report-only otherwise.
    pub repair_duplicates: bool,

    pub retry: RetryPolicy,

    /// Stop after this many pages per target (status `paused`).
    pub max_pages: Option<u64>,

    /// Resume a single target from an explicitly supplied cursor.
    pub start_cursor: Option<PageCursor>,

    /// Targets scanned concurrently by a campaign.
    pub jobs: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            dry_run: false,
            shard_task: None,
            orphan_window: None,
            repair_duplicates: false,
            retry: RetryPolicy::default(),
            max_pages: None,
            start_cursor: None,
            jobs: 1,
        }
    }
}

impl AuditSettings {
    /// Reject combinations that cannot be run, before any store call.
    pub fn validate(&self, mode: ScanMode) -> AuditResult<()> {
        if self.page_size == 0 {
            return Err(AuditError::configuration("page size must be at least 1"));
        }
        if self.jobs == 0 {
            return Err(AuditError::configuration("jobs must be at least 1"));
        }
        if self.max_pages == Some(0) {
            return Err(AuditError::configuration("max pages must be at least 1"));
        }
        match (mode, self.shard_task) {
            (ScanMode::ShardRepair, None) => {
                return Err(AuditError::configuration(
                    "shard-repair mode requires a repair task",
                ));
            }
            (ScanMode::OrphanIndex | ScanMode::DuplicateReference, Some(task)) => {
                return Err(AuditError::configuration(format!(
                    "repair task '{}' only applies to shard-repair mode",
                    task
                )));
            }
            _ => {}
        }
        if let Some(w) = self.orphan_window {
            if mode != ScanMode::OrphanIndex {
                return Err(AuditError::configuration(
                    "orphan age window only applies to orphan-index mode",
                ));
            }
            if w.earliest_ms > w.latest_ms {
                return Err(AuditError::configuration(format!(
                    "orphan window is empty: earliest {} > latest {}",
                    w.earliest_ms, w.latest_ms
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_index_modes() {
        let s = AuditSettings::default();
        assert!(s.validate(ScanMode::OrphanIndex).is_ok());
        assert!(s.validate(ScanMode::DuplicateReference).is_ok());
    }

    #[test]
    fn shard_mode_requires_task() {
        let s = AuditSettings::default();
        let err = s.validate(ScanMode::ShardRepair).unwrap_err();
        assert!(err.is_configuration());

        let s = AuditSettings {
            shard_task: Some(ShardTask::RemoveAllShardEnds),
            ..AuditSettings::default()
        };
        assert!(s.validate(ScanMode::ShardRepair).is_ok());
        assert!(s.validate(ScanMode::OrphanIndex).is_err());
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let s = AuditSettings {
            page_size: 0,
            ..AuditSettings::default()
        };
        assert!(s.validate(ScanMode::OrphanIndex).is_err());
    }

    #[test]
    fn orphan_window_bounds() {
        let w = OrphanWindow::older_than(10_000_000, 3600);
        assert_eq!(w.latest_ms, 10_000_000 - 3_600_000);
        assert!(w.contains(0));
        assert!(w.contains(w.latest_ms));
        assert!(!w.contains(w.latest_ms + 1));

        let inverted = AuditSettings {
            orphan_window: Some(OrphanWindow {
                earliest_ms: 5,
                latest_ms: 4,
            }),
            ..AuditSettings::default()
        };
        assert!(inverted.validate(ScanMode::OrphanIndex).is_err());
    }
}
