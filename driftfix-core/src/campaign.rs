//! Target resolution and multi-target campaigns.

use crate::cancel::CancelToken;
use crate::error::{AuditError, AuditResult, StoreError};
use crate::paginator::Paginator;
use crate::ports::{CheckpointPort, Store};
use crate::runner::{AuditRunner, ProgressObserver};
use crate::settings::AuditSettings;
use chrono::Utc;
use driftfix_types::{
    CampaignReport, CampaignTotals, Namespace, PageCursor, RunStatus, RunSummary, ScanMode,
    ToolInfo, Target,
};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Mutex;
use tracing::{info, warn};

/// What a campaign covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignScope {
    Target(Target),
    Namespace { namespace: Namespace, mode: ScanMode },
    All { mode: ScanMode },
}

impl CampaignScope {
    pub fn mode(&self) -> ScanMode {
        match self {
            CampaignScope::Target(t) => t.mode,
            CampaignScope::Namespace { mode, .. } | CampaignScope::All { mode } => *mode,
        }
    }
}

/// Targets a scope expands to, in scan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTargets {
    pub targets: Vec<Target>,
    pub namespaces_visited: u64,
    /// `"<namespace>: <error>"` for every namespace whose listing failed.
    pub catalog_failures: Vec<String>,
}

pub struct CampaignController<'a> {
    store: &'a dyn Store,
    settings: AuditSettings,
    checkpoints: Option<&'a dyn CheckpointPort>,
    observer: Option<&'a dyn ProgressObserver>,
    cancel: CancelToken,
    tool: ToolInfo,
}

impl<'a> CampaignController<'a> {
    pub fn new(store: &'a dyn Store, settings: AuditSettings) -> Self {
        Self {
            store,
            settings,
            checkpoints: None,
            observer: None,
            cancel: CancelToken::new(),
            tool: ToolInfo {
                name: "driftfix".to_string(),
                version: None,
            },
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

    pub fn with_tool(mut self, tool: ToolInfo) -> Self {
        self.tool = tool;
        self
    }

    /// Expand `scope` against the catalog.
    ///
    /// An unknown namespace or structure named explicitly is a configuration
    /// error. A failed structure listing under `Namespace` or `All` is recorded
    /// and skipped.
    pub fn resolve_targets(&self, scope: &CampaignScope) -> AuditResult<ResolvedTargets> {
        let mut resolved = ResolvedTargets::default();
        match scope {
            CampaignScope::Target(target) => {
                self.require_namespace(&target.namespace)?;
                let structures = self.list_structures(&target.namespace, target.mode)?;
                if !structures.contains(&target.structure) {
                    return Err(AuditError::configuration(format!(
                        "unknown {} structure '{}' in namespace '{}'",
                        target.mode, target.structure, target.namespace
                    )));
                }
                resolved.namespaces_visited = 1;
                resolved.targets.push(target.clone());
            }
            CampaignScope::Namespace { namespace, mode } => {
                self.require_namespace(namespace)?;
                self.expand_namespace(namespace, *mode, &mut resolved);
            }
            CampaignScope::All { mode } => {
                let namespaces = self.list_namespaces()?;
                for namespace in &namespaces {
                    self.expand_namespace(namespace, *mode, &mut resolved);
                }
            }
        }
        Ok(resolved)
    }

    /// Run every target in scope and aggregate the results.
    ///
    /// Errors only for configuration problems or when the catalog itself
    /// cannot be read. Per-target failures are reported in the summaries.
    pub fn run(&self, scope: &CampaignScope) -> AuditResult<CampaignReport> {
        let mode = scope.mode();
        self.settings.validate(mode)?;
        if self.settings.start_cursor.is_some() && !matches!(scope, CampaignScope::Target(_)) {
            return Err(AuditError::configuration(
                "a start cursor needs a single target (namespace and structure)",
            ));
        }

        let mut report = CampaignReport::new(self.tool.clone(), mode, self.settings.dry_run);
        let resolved = self.resolve_targets(scope)?;
        if let (Some(cursor), [target]) = (&self.settings.start_cursor, resolved.targets.as_slice()) {
            self.check_start_cursor(target, cursor)?;
        }
        info!(
            mode = %mode,
            targets = resolved.targets.len(),
            namespaces = resolved.namespaces_visited,
            jobs = self.settings.jobs,
            dry_run = self.settings.dry_run,
            "campaign started"
        );

        let summaries = if self.settings.jobs > 1 && resolved.targets.len() > 1 {
            self.run_parallel(&resolved.targets)
        } else {
            self.run_sequential(&resolved.targets)
        };

        report.interrupted = self.cancel.is_cancelled()
            || summaries.iter().any(|s| s.status == RunStatus::Interrupted);
        report.totals = CampaignTotals::from_summaries(&summaries, resolved.namespaces_visited);
        report.totals.catalog_failures = resolved.catalog_failures;
        report.targets = summaries;
        report.ended_at = Some(Utc::now());

        info!(
            targets = report.totals.targets_total,
            failed = report.totals.targets_failed,
            divergences = report.totals.counts.divergences_found,
            repaired = report.totals.counts.repairs_applied,
            repair_failures = report.totals.counts.repairs_failed,
            interrupted = report.interrupted,
            "campaign finished"
        );
        Ok(report)
    }

    fn run_target(&self, target: &Target) -> RunSummary {
        let mut runner = AuditRunner::new(self.store, &self.settings).with_cancel(self.cancel.clone());
        if let Some(checkpoints) = self.checkpoints {
            runner = runner.with_checkpoints(checkpoints);
        }
        if let Some(observer) = self.observer {
            runner = runner.with_observer(observer);
        }
        runner.run(target)
    }

    fn run_sequential(&self, targets: &[Target]) -> Vec<RunSummary> {
        let mut summaries = Vec::with_capacity(targets.len());
        for target in targets {
            if self.cancel.is_cancelled() {
                break;
            }
            summaries.push(self.run_target(target));
        }
        summaries
    }

    fn run_parallel(&self, targets: &[Target]) -> Vec<RunSummary> {
        let queue: Mutex<VecDeque<(usize, &Target)>> =
            Mutex::new(targets.iter().enumerate().collect());
        let results: Mutex<Vec<(usize, RunSummary)>> = Mutex::new(Vec::with_capacity(targets.len()));
        let workers = self.settings.jobs.min(targets.len());

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        let next = queue.lock().unwrap_or_else(|p| p.into_inner()).pop_front();
                        let Some((index, target)) = next else {
                            break;
                        };
                        let summary = self.run_target(target);
                        results
                            .lock()
                            .unwrap_or_else(|p| p.into_inner())
                            .push((index, summary));
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|p| p.into_inner());
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, summary)| summary).collect()
    }

    fn expand_namespace(&self, namespace: &Namespace, mode: ScanMode, resolved: &mut ResolvedTargets) {
        resolved.namespaces_visited += 1;
        match self.list_structures(namespace, mode) {
            Ok(structures) => {
                resolved.targets.extend(
                    structures
                        .into_iter()
                        .map(|s| Target::new(namespace.clone(), s, mode)),
                );
            }
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "could not list structures; skipping namespace");
                resolved.catalog_failures.push(format!("{}: {}", namespace, e));
            }
        }
    }

    /// A cursor the store refuses to decode is bad input, not an outage.
    /// Transient failures are left for the runner to report.
    fn check_start_cursor(&self, target: &Target, cursor: &PageCursor) -> AuditResult<()> {
        let pages = Paginator::new(self.store, target.clone(), 1, self.settings.retry.clone());
        match pages.fetch_page(Some(cursor)) {
            Err(AuditError::StoreUnavailable {
                source: StoreError::Rejected(reason),
                ..
            }) => Err(AuditError::configuration(format!(
                "start cursor '{}' is not valid for {}: {}",
                cursor, target, reason
            ))),
            _ => Ok(()),
        }
    }

    fn require_namespace(&self, namespace: &Namespace) -> AuditResult<()> {
        if self.list_namespaces()?.contains(namespace) {
            Ok(())
        } else {
            Err(AuditError::configuration(format!(
                "unknown namespace '{}'",
                namespace
            )))
        }
    }

    fn list_namespaces(&self) -> AuditResult<BTreeSet<Namespace>> {
        self.settings
            .retry
            .run("list_namespaces", || self.store.list_namespaces())
            .map_err(|e| AuditError::StoreUnavailable {
                scope: "catalog".to_string(),
                attempts: e.attempts,
                source: e.error,
            })
    }

    fn list_structures(&self, namespace: &Namespace, mode: ScanMode) -> AuditResult<BTreeSet<String>> {
        self.settings
            .retry
            .run("list_structures", || self.store.list_structures(namespace, mode))
            .map_err(|e| AuditError::StoreUnavailable {
                scope: format!("catalog {}", namespace),
                attempts: e.attempts,
                source: e.error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FaultInjectingStore, MemoryStore};
    use crate::retry::RetryPolicy;
    use driftfix_types::IndexRecord;
    use pretty_assertions::assert_eq;

    fn settings() -> AuditSettings {
        AuditSettings {
            page_size: 2,
            retry: RetryPolicy::none(),
            ..AuditSettings::default()
        }
    }

    /// Three namespaces with two collections each; every third entry is an orphan.
    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        for ns in ["a", "b", "c"] {
            for coll in ["groups", "users"] {
                for i in 0..5 {
                    let id = format!("{ns}-{coll}-{i}");
                    store.insert_index_entry(ns, coll, IndexRecord::new(id.as_str(), "0"));
                    if i % 3 != 0 {
                        store.insert_entity(ns, id.as_str());
                    }
                }
            }
        }
        store
    }

    #[test]
    fn all_scope_expands_in_catalog_order() {
        let store = store();
        let controller = CampaignController::new(&store, settings());
        let resolved = controller
            .resolve_targets(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("resolve");
        let keys: Vec<String> = resolved.targets.iter().map(Target::key).collect();
        assert_eq!(
            keys,
            vec![
                "a/groups/orphan-index",
                "a/users/orphan-index",
                "b/groups/orphan-index",
                "b/users/orphan-index",
                "c/groups/orphan-index",
                "c/users/orphan-index",
            ]
        );
        assert_eq!(resolved.namespaces_visited, 3);
    }

    #[test]
    fn unknown_target_is_a_configuration_error() {
        let store = store();
        let controller = CampaignController::new(&store, settings());
        let err = controller
            .run(&CampaignScope::Target(Target::new(
                "a",
                "nope",
                ScanMode::OrphanIndex,
            )))
            .unwrap_err();
        assert!(err.is_configuration());

        let err = controller
            .run(&CampaignScope::Namespace {
                namespace: "zz".into(),
                mode: ScanMode::OrphanIndex,
            })
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn start_cursor_requires_single_target() {
        let store = store();
        let s = AuditSettings {
            start_cursor: Some(PageCursor::new("x")),
            ..settings()
        };
        let err = CampaignController::new(&store, s)
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn campaign_aggregates_every_target() {
        let store = store();
        let report = CampaignController::new(&store, settings())
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("report");
        assert_eq!(report.targets.len(), 6);
        assert_eq!(report.totals.targets_total, 6);
        assert_eq!(report.totals.counts.records_scanned, 30);
        assert_eq!(report.totals.counts.divergences_found, 12);
        assert_eq!(report.totals.counts.repairs_applied, 12);
        assert!(!report.interrupted);
        assert!(report.ended_at.is_some());
    }

    #[test]
    fn concurrent_totals_equal_sequential_totals() {
        let sequential = CampaignController::new(&store(), settings())
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("sequential");

        let parallel_store = store();
        let parallel = CampaignController::new(
            &parallel_store,
            AuditSettings {
                jobs: 4,
                ..settings()
            },
        )
        .run(&CampaignScope::All {
            mode: ScanMode::OrphanIndex,
        })
        .expect("parallel");

        assert_eq!(parallel.totals.counts, sequential.totals.counts);
        let order: Vec<String> = parallel.targets.iter().map(|s| s.target.key()).collect();
        let expected: Vec<String> = sequential.targets.iter().map(|s| s.target.key()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn failing_namespace_listing_is_recorded_and_skipped() {
        let store = FaultInjectingStore::new(store()).fail_catalog_for("b");
        let report = CampaignController::new(&store, settings())
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("report");
        assert_eq!(report.targets.len(), 4);
        assert_eq!(report.totals.catalog_failures.len(), 1);
        assert!(report.totals.catalog_failures[0].starts_with("b: "));
        assert!(report.any_store_unavailable());
    }

    #[test]
    fn one_failed_target_does_not_stop_the_campaign() {
        // Fetch 1 is a/groups page 1; fetch 2 (a/groups page 2) fails.
        let flaky = FaultInjectingStore::new(store()).fail_fetches_from(2);
        let report = CampaignController::new(&flaky, settings())
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("report");
        assert_eq!(report.targets.len(), 6);
        assert_eq!(report.targets[0].counts.pages_scanned, 1);
        assert!(report.targets.iter().all(RunSummary::is_failed));
        assert!(report.any_store_unavailable());
    }

    #[test]
    fn cancelled_campaign_starts_no_targets() {
        let store = store();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = CampaignController::new(&store, settings())
            .with_cancel(cancel)
            .run(&CampaignScope::All {
                mode: ScanMode::OrphanIndex,
            })
            .expect("report");
        assert!(report.interrupted);
        assert!(report.targets.is_empty());
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn rerunning_a_cleaned_target_finds_nothing() {
        let store = MemoryStore::new();
        store.insert_index_entry("app", "users", IndexRecord::new("ghost", "0"));
        let controller = CampaignController::new(&store, settings());
        let scope = CampaignScope::Target(Target::new("app", "users", ScanMode::OrphanIndex));

        let first = controller.run(&scope).expect("first run");
        assert_eq!(first.totals.counts.repairs_applied, 1);
        assert!(store.index_entries(&Namespace::new("app"), "users").is_empty());

        let second = controller.run(&scope).expect("second run");
        assert_eq!(second.targets.len(), 1);
        assert_eq!(second.targets[0].status, RunStatus::Completed);
        assert_eq!(second.totals.counts.divergences_found, 0);
    }

    #[test]
    fn undecodable_start_cursor_is_a_configuration_error() {
        let store = store();
        let s = AuditSettings {
            start_cursor: Some(PageCursor::new("not-a-cursor")),
            ..settings()
        };
        let err = CampaignController::new(&store, s)
            .run(&CampaignScope::Target(Target::new(
                "a",
                "users",
                ScanMode::OrphanIndex,
            )))
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("not-a-cursor"));
        assert_eq!(store.mutation_count(), 0);
    }
}
