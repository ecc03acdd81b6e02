use crate::summary::{RunCounts, RunStatus, RunSummary};
use crate::target::ScanMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Aggregate over every target a campaign visited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignTotals {
    pub namespaces_visited: u64,
    pub targets_total: u64,
    pub targets_failed: u64,
    pub targets_interrupted: u64,

    #[serde(flatten)]
    pub counts: RunCounts,

    /// Namespaces whose structures could not be listed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub catalog_failures: Vec<String>,
}

impl CampaignTotals {
    pub fn from_summaries(summaries: &[RunSummary], namespaces_visited: u64) -> Self {
        let mut totals = CampaignTotals {
            namespaces_visited,
            targets_total: summaries.len() as u64,
            ..CampaignTotals::default()
        };
        for s in summaries {
            totals.counts += s.counts;
            match s.status {
                RunStatus::Failed => totals.targets_failed += 1,
                RunStatus::Interrupted => totals.targets_interrupted += 1,
                RunStatus::Completed | RunStatus::Paused => {}
            }
        }
        totals
    }
}

/// The `driftfix.report.v1` artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignReport {
    pub schema: String,
    pub run_id: Uuid,
    pub tool: ToolInfo,
    pub mode: ScanMode,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub interrupted: bool,

    #[serde(default)]
    pub targets: Vec<RunSummary>,

    pub totals: CampaignTotals,
}

impl CampaignReport {
    pub fn new(tool: ToolInfo, mode: ScanMode, dry_run: bool) -> Self {
        Self {
            schema: crate::schema::DRIFTFIX_REPORT_V1.to_string(),
            run_id: Uuid::new_v4(),
            tool,
            mode,
            dry_run,
            started_at: Utc::now(),
            ended_at: None,
            interrupted: false,
            targets: vec![],
            totals: CampaignTotals::default(),
        }
    }

    pub fn any_store_unavailable(&self) -> bool {
        self.totals.targets_failed > 0 || !self.totals.catalog_failures.is_empty()
    }

    pub fn any_repair_failures(&self) -> bool {
        self.totals.counts.repairs_failed > 0
    }
}
