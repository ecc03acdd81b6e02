//! Single-target scan/classify/repair loop.

use crate::cancel::CancelToken;
use crate::classifier::DivergenceClassifier;
use crate::error::AuditError;
use crate::executor::RepairExecutor;
use crate::paginator::Paginator;
use crate::ports::{CheckpointPort, Store};
use crate::settings::AuditSettings;
use driftfix_types::{
    Checkpoint, PageCursor, RepairAction, RepairOutcome, RunCounts, RunStatus, RunSummary,
    ScanMode, Target,
};
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scanning,
    Classifying,
    Repairing,
    Done,
    Failed,
    Interrupted,
}

/// Emitted after every fully processed page.
#[derive(Debug, Clone)]
pub struct PageProgress<'a> {
    pub target: &'a Target,
    /// Zero-based index of the page within this invocation.
    pub page_index: u64,
    /// Where the next page starts; `None` after the final page.
    pub next_cursor: Option<&'a PageCursor>,
    /// Counts so far, including any resumed from a checkpoint.
    pub counts: RunCounts,
}

pub trait ProgressObserver: Send + Sync {
    fn on_page(&self, progress: &PageProgress<'_>);
}

/// Drives one target from its start (or resume point) to a terminal state.
pub struct AuditRunner<'a> {
    store: &'a dyn Store,
    settings: &'a AuditSettings,
    checkpoints: Option<&'a dyn CheckpointPort>,
    observer: Option<&'a dyn ProgressObserver>,
    cancel: CancelToken,
    state: RunState,
}

struct ResumePoint {
    cursor: PageCursor,
    counts: RunCounts,
    position: u64,
}

impl<'a> AuditRunner<'a> {
    pub fn new(store: &'a dyn Store, settings: &'a AuditSettings) -> Self {
        Self {
            store,
            settings,
            checkpoints: None,
            observer: None,
            cancel: CancelToken::new(),
            state: RunState::Idle,
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: &'a dyn CheckpointPort) -> Self {
        self.checkpoints = Some(checkpoints);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Scan `target` and return its summary. Never fails: run-level errors end
    /// in a `failed` summary.
    pub fn run(&mut self, target: &Target) -> RunSummary {
        let started = Instant::now();
        self.state = RunState::Scanning;
        let settings = self.settings;

        let resume = self.resume_point(target);
        let mut counts = resume.as_ref().map(|r| r.counts).unwrap_or_default();
        let resumed_from = resume.as_ref().map(|r| r.cursor.clone());

        let mut classifier = DivergenceClassifier::new(self.store, target.clone(), settings)
            .with_position(resume.as_ref().map(|r| r.position).unwrap_or(0));

        info!(
            target_key = %target,
            dry_run = settings.dry_run,
            resumed_from = ?resumed_from,
            "audit started"
        );

        let mut summary = RunSummary {
            target: target.clone(),
            status: RunStatus::Completed,
            counts,
            duration_ms: 0,
            dry_run: settings.dry_run,
            resumed_from: resumed_from.clone(),
            next_cursor: None,
            error: None,
        };

        if target.mode == ScanMode::DuplicateReference {
            match self.survey(target, &mut classifier) {
                Ok(true) => {}
                Ok(false) => {
                    info!(target_key = %target, "audit interrupted during duplicate survey");
                    self.state = RunState::Interrupted;
                    summary.status = RunStatus::Interrupted;
                    summary.next_cursor = resumed_from;
                    summary.duration_ms = started.elapsed().as_millis() as u64;
                    return summary;
                }
                Err(e) => return self.fail(summary, e, resumed_from, started),
            }
        }

        let mut pages = Paginator::new(
            self.store,
            target.clone(),
            settings.page_size,
            settings.retry.clone(),
        );
        if let Some(cursor) = resumed_from.clone() {
            pages = pages.resume_from(cursor);
        }
        let executor = RepairExecutor::new(self.store, settings.retry.clone());
        let mut page_index: u64 = 0;

        loop {
            if !pages.is_done() && self.cancel.is_cancelled() {
                info!(target_key = %target, pages = page_index, "audit interrupted");
                self.state = RunState::Interrupted;
                summary.status = RunStatus::Interrupted;
                summary.next_cursor = pages.next_cursor().cloned();
                break;
            }
            if !pages.is_done() && matches!(settings.max_pages, Some(max) if page_index >= max) {
                info!(target_key = %target, pages = page_index, "page budget reached; pausing");
                self.state = RunState::Done;
                summary.status = RunStatus::Paused;
                summary.next_cursor = pages.next_cursor().cloned();
                break;
            }

            self.state = RunState::Scanning;
            let resume_cursor = pages.next_cursor().cloned();
            let page = match pages.next_page() {
                Ok(Some(page)) => page,
                Ok(None) => {
                    self.state = RunState::Done;
                    break;
                }
                Err(e) => {
                    summary.counts = counts;
                    return self.fail(summary, e, resume_cursor, started);
                }
            };

            self.state = RunState::Classifying;
            let classification = match classifier.classify(&page) {
                Ok(c) => c,
                Err(e) => {
                    summary.counts = counts;
                    return self.fail(summary, e, resume_cursor, started);
                }
            };

            let mut page_counts = RunCounts {
                pages_scanned: 1,
                records_scanned: page.len() as u64,
                data_quality_warnings: classification.warnings.len() as u64,
                ..RunCounts::default()
            };

            self.state = RunState::Repairing;
            for verdict in classification.divergent() {
                page_counts.divergences_found += 1;
                if settings.dry_run {
                    info!(
                        target_key = %target,
                        record = %verdict.record,
                        action = %verdict.action,
                        "would repair"
                    );
                    page_counts.repairs_skipped += 1;
                    continue;
                }
                if matches!(verdict.action, RepairAction::Reinsert { .. })
                    && !settings.repair_duplicates
                {
                    info!(
                        target_key = %target,
                        record = %verdict.record,
                        action = %verdict.action,
                        "duplicate reported; merging disabled"
                    );
                    page_counts.repairs_skipped += 1;
                    continue;
                }
                match executor.apply(verdict, target) {
                    RepairOutcome::Success => page_counts.repairs_applied += 1,
                    RepairOutcome::Failed { reason } => {
                        warn!(
                            target_key = %target,
                            record = %verdict.record,
                            action = %verdict.action,
                            reason = reason.as_str(),
                            "repair failed"
                        );
                        page_counts.repairs_failed += 1;
                    }
                }
            }
            counts += page_counts;
            summary.counts = counts;

            self.checkpoint(target, pages.next_cursor(), counts, classifier.position());

            if let Some(observer) = self.observer {
                observer.on_page(&PageProgress {
                    target,
                    page_index,
                    next_cursor: pages.next_cursor(),
                    counts,
                });
            }
            info!(
                target_key = %target,
                page = page_index,
                records = page_counts.records_scanned,
                divergences = page_counts.divergences_found,
                repaired = page_counts.repairs_applied,
                failed = page_counts.repairs_failed,
                "page processed"
            );
            page_index += 1;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            target_key = %target,
            status = ?summary.status,
            records = counts.records_scanned,
            divergences = counts.divergences_found,
            repaired = counts.repairs_applied,
            failed = counts.repairs_failed,
            skipped = counts.repairs_skipped,
            "audit finished"
        );
        summary
    }

    /// Feed the whole target into the canonical index. `false` when a cancel
    /// cut the pass short; duplicate groups are only logged for a full pass.
    fn survey(
        &self,
        target: &Target,
        classifier: &mut DivergenceClassifier<'_>,
    ) -> Result<bool, AuditError> {
        let mut pages = Paginator::new(
            self.store,
            target.clone(),
            self.settings.page_size,
            self.settings.retry.clone(),
        );
        while !self.cancel.is_cancelled() {
            let Some(page) = pages.next_page()? else {
                debug!(
                    target_key = %target,
                    keys = classifier.canonical_index().len(),
                    "duplicate survey finished"
                );
                classifier.log_duplicate_groups();
                return Ok(true);
            };
            classifier.survey(&page);
        }
        debug!(target_key = %target, "duplicate survey cancelled");
        Ok(false)
    }

    fn resume_point(&self, target: &Target) -> Option<ResumePoint> {
        if let Some(cursor) = &self.settings.start_cursor {
            // Records before an explicit cursor are not counted here, but the
            // scan is known not to be at the head of the structure.
            return Some(ResumePoint {
                cursor: cursor.clone(),
                counts: RunCounts::default(),
                position: 1,
            });
        }
        if self.settings.dry_run {
            return None;
        }
        let checkpoints = self.checkpoints?;
        match checkpoints.load(target) {
            Ok(Some(cp)) => Some(ResumePoint {
                cursor: cp.cursor,
                counts: cp.counts,
                position: cp.position,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!(target_key = %target, error = %format!("{:#}", e), "ignoring unreadable checkpoint");
                None
            }
        }
    }

    /// Save the resume point, or clear it once there is nothing left to resume.
    fn checkpoint(&self, target: &Target, next: Option<&PageCursor>, counts: RunCounts, position: u64) {
        if self.settings.dry_run {
            return;
        }
        let Some(checkpoints) = self.checkpoints else {
            return;
        };
        let result = match next {
            Some(cursor) => {
                let mut cp = Checkpoint::new(target.clone(), cursor.clone(), counts);
                cp.position = position;
                checkpoints.save(&cp)
            }
            None => checkpoints.clear(target),
        };
        if let Err(e) = result {
            warn!(target_key = %target, error = %format!("{:#}", e), "checkpoint write failed");
        }
    }

    fn fail(
        &mut self,
        mut summary: RunSummary,
        error: AuditError,
        next_cursor: Option<PageCursor>,
        started: Instant,
    ) -> RunSummary {
        warn!(target_key = %summary.target, error = %error, "audit failed");
        self.state = RunState::Failed;
        summary.status = RunStatus::Failed;
        summary.error = Some(error.to_string());
        summary.next_cursor = next_cursor;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary
    }
}
