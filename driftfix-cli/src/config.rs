//! Configuration file loading for driftfix.
//!
//! Discovers and loads `driftfix.toml` from the working directory.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use driftfix_core::settings::{DEFAULT_PAGE_SIZE, DEFAULT_SECONDS_IN_PAST};
use driftfix_core::{OrphanWindow, RetryPolicy};
use fs_err as fs;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "driftfix.toml";

/// Top-level configuration from driftfix.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriftfixConfig {
    pub audit: AuditConfig,

    /// Backoff for every store call.
    pub retry: RetryPolicy,

    /// Age window for orphan deletion.
    pub orphans: OrphansConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub page_size: Option<usize>,

    /// Targets scanned concurrently.
    pub jobs: Option<usize>,

    /// Where per-target checkpoints are kept. Checkpointing is off when unset.
    pub checkpoint_dir: Option<Utf8PathBuf>,

    /// Apply duplicate-reference merges instead of only reporting them.
    pub merge_duplicates: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OrphansConfig {
    pub seconds_in_past: Option<i64>,
    pub earliest_ms: Option<i64>,
    pub latest_ms: Option<i64>,
}

impl OrphansConfig {
    fn is_empty(&self) -> bool {
        self.seconds_in_past.is_none() && self.earliest_ms.is_none() && self.latest_ms.is_none()
    }

    /// Resolve to a concrete window, measuring `seconds_in_past` from `now_ms`.
    ///
    /// `None` when nothing is set. `latest_ms` and `seconds_in_past` are
    /// mutually exclusive; with neither, the latest bound defaults to one hour ago.
    pub fn window(&self, now_ms: i64) -> anyhow::Result<Option<OrphanWindow>> {
        if self.is_empty() {
            return Ok(None);
        }
        if self.latest_ms.is_some() && self.seconds_in_past.is_some() {
            anyhow::bail!("set either latest_ms or seconds_in_past for the orphan window, not both");
        }
        let latest_ms = match self.latest_ms {
            Some(latest) => latest,
            None => {
                let seconds = self.seconds_in_past.unwrap_or(DEFAULT_SECONDS_IN_PAST);
                now_ms - seconds * 1000
            }
        };
        Ok(Some(OrphanWindow {
            earliest_ms: self.earliest_ms.unwrap_or(0),
            latest_ms,
        }))
    }
}

/// Look for `driftfix.toml` in `dir`.
pub fn discover_config(dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

pub fn load_config(path: &Utf8Path) -> anyhow::Result<DriftfixConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<DriftfixConfig> {
    let config: DriftfixConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load the explicit config file if given, else discover one in `dir`.
pub fn load_or_default(
    explicit: Option<&Utf8Path>,
    dir: &Utf8Path,
) -> anyhow::Result<DriftfixConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match discover_config(dir) {
        Some(path) => load_config(&path),
        None => Ok(DriftfixConfig::default()),
    }
}

/// CLI values that may override the file.
#[derive(Debug, Clone, Default)]
pub struct AuditOverrides {
    pub page_size: Option<usize>,
    pub jobs: Option<usize>,
    pub checkpoint_dir: Option<Utf8PathBuf>,
    pub merge_duplicates: bool,
    pub orphans: OrphansConfig,
}

/// Merged configuration combining config file and CLI arguments.
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub page_size: usize,
    pub jobs: usize,
    pub checkpoint_dir: Option<Utf8PathBuf>,
    pub merge_duplicates: bool,
    pub retry: RetryPolicy,
    pub orphan_window: Option<OrphanWindow>,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: DriftfixConfig,
}

impl ConfigMerger {
    pub fn new(config: DriftfixConfig) -> Self {
        Self { config }
    }

    /// Merge with audit command arguments.
    ///
    /// Scalar CLI values replace file values. `--merge-duplicates` can only turn
    /// merging on. The orphan window comes from the CLI when any of its flags
    /// are given, otherwise from the file.
    pub fn merge_audit_args(self, cli: AuditOverrides, now_ms: i64) -> anyhow::Result<MergedConfig> {
        let orphans = if cli.orphans.is_empty() {
            &self.config.orphans
        } else {
            &cli.orphans
        };
        let orphan_window = orphans.window(now_ms)?;

        Ok(MergedConfig {
            page_size: cli
                .page_size
                .or(self.config.audit.page_size)
                .unwrap_or(DEFAULT_PAGE_SIZE),
            jobs: cli.jobs.or(self.config.audit.jobs).unwrap_or(1),
            checkpoint_dir: cli.checkpoint_dir.or(self.config.audit.checkpoint_dir),
            merge_duplicates: cli.merge_duplicates || self.config.audit.merge_duplicates,
            retry: self.config.retry,
            orphan_window,
        })
    }
}
