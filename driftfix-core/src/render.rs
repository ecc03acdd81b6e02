//! Human-readable campaign summaries.

use driftfix_types::{CampaignReport, RunStatus};

pub fn render_report_md(report: &CampaignReport) -> String {
    let totals = &report.totals;
    let mut out = String::new();
    out.push_str(&format!("# driftfix {}\n\n", report.mode));
    if report.dry_run {
        out.push_str("_Dry run: no repairs were applied._\n\n");
    }
    out.push_str(&format!(
        "- Targets: {} (failed {}, interrupted {})\n",
        totals.targets_total, totals.targets_failed, totals.targets_interrupted
    ));
    out.push_str(&format!("- Namespaces: {}\n", totals.namespaces_visited));
    out.push_str(&format!(
        "- Records: {} in {} page(s)\n",
        totals.counts.records_scanned, totals.counts.pages_scanned
    ));
    out.push_str(&format!(
        "- Divergences: {} (repaired {}, failed {}, skipped {})\n",
        totals.counts.divergences_found,
        totals.counts.repairs_applied,
        totals.counts.repairs_failed,
        totals.counts.repairs_skipped
    ));
    if totals.counts.data_quality_warnings > 0 {
        out.push_str(&format!(
            "- Data quality warnings: {}\n",
            totals.counts.data_quality_warnings
        ));
    }
    if report.interrupted {
        out.push_str("- Interrupted: yes\n");
    }
    out.push('\n');

    if !totals.catalog_failures.is_empty() {
        out.push_str("## Catalog failures\n\n");
        for failure in &totals.catalog_failures {
            out.push_str(&format!("- {}\n", failure));
        }
        out.push('\n');
    }

    out.push_str("## Targets\n\n");
    if report.targets.is_empty() {
        out.push_str("_No targets scanned._\n");
        return out;
    }

    out.push_str("| Target | Status | Records | Divergences | Repaired | Failed | Skipped |\n");
    out.push_str("|---|---|---:|---:|---:|---:|---:|\n");
    for s in &report.targets {
        out.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | {} | {} |\n",
            s.target,
            status_label(s.status),
            s.counts.records_scanned,
            s.counts.divergences_found,
            s.counts.repairs_applied,
            s.counts.repairs_failed,
            s.counts.repairs_skipped
        ));
    }

    let notes: Vec<String> = report
        .targets
        .iter()
        .filter_map(|s| {
            let mut parts = vec![];
            if let Some(err) = &s.error {
                parts.push(err.clone());
            }
            if let Some(cursor) = &s.next_cursor {
                parts.push(format!("resume with `--start-cursor '{}'`", cursor));
            }
            (!parts.is_empty()).then(|| format!("- `{}`: {}", s.target, parts.join("; ")))
        })
        .collect();
    if !notes.is_empty() {
        out.push_str("\n**Notes**\n\n");
        for note in notes {
            out.push_str(&note);
            out.push('\n');
        }
    }
    out
}

fn status_label(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Completed => "completed",
        RunStatus::Paused => "paused",
        RunStatus::Interrupted => "interrupted",
        RunStatus::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftfix_types::{
        CampaignTotals, PageCursor, RunCounts, RunSummary, ScanMode, Target, ToolInfo,
    };

    fn report() -> CampaignReport {
        let mut report = CampaignReport::new(
            ToolInfo {
                name: "driftfix".to_string(),
                version: None,
            },
            ScanMode::OrphanIndex,
            false,
        );
        report.targets = vec![
            RunSummary {
                target: Target::new("app", "users", ScanMode::OrphanIndex),
                status: RunStatus::Completed,
                counts: RunCounts {
                    pages_scanned: 1,
                    records_scanned: 3,
                    divergences_found: 1,
                    repairs_applied: 1,
                    ..RunCounts::default()
                },
                duration_ms: 5,
                dry_run: false,
                resumed_from: None,
                next_cursor: None,
                error: None,
            },
            RunSummary {
                target: Target::new("app", "groups", ScanMode::OrphanIndex),
                status: RunStatus::Paused,
                counts: RunCounts::default(),
                duration_ms: 1,
                dry_run: false,
                resumed_from: None,
                next_cursor: Some(PageCursor::new("c9")),
                error: None,
            },
        ];
        report.totals = CampaignTotals::from_summaries(&report.targets, 1);
        report
    }

    #[test]
    fn renders_totals_and_rows() {
        let md = render_report_md(&report());
        assert!(md.starts_with("# driftfix orphan-index\n"));
        assert!(md.contains("- Targets: 2 (failed 0, interrupted 0)"));
        assert!(md.contains("| `app/users/orphan-index` | completed | 3 | 1 | 1 | 0 | 0 |"));
        assert!(md.contains("`app/groups/orphan-index`: resume with `--start-cursor 'c9'`"));
    }

    #[test]
    fn empty_report_says_so() {
        let mut r = report();
        r.targets.clear();
        r.totals = CampaignTotals::default();
        r.dry_run = true;
        let md = render_report_md(&r);
        assert!(md.contains("_Dry run"));
        assert!(md.contains("_No targets scanned._"));
    }
}
