mod config;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{AuditOverrides, ConfigMerger, OrphansConfig};
use driftfix_core::adapters::{FsCheckpointStore, load_snapshot, save_snapshot};
use driftfix_core::types::{Namespace, PageCursor, ScanMode, ShardTask, Target, ToolInfo};
use driftfix_core::{
    AuditError, AuditSettings, CampaignController, CampaignScope, CancelToken, render_report_md,
};
use fs_err as fs;
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "driftfix",
    version,
    about = "Find and repair drift between secondary indexes, shard metadata and primary data."
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scan targets, classify divergences and repair them.
    Audit(AuditArgs),
    /// List the targets a scope resolves to.
    ListTargets(ListTargetsArgs),
}

#[derive(Debug, Parser)]
struct AuditArgs {
    /// Store snapshot (JSON) to audit; rewritten in place after repairs.
    #[arg(long)]
    store: Utf8PathBuf,

    /// Scan mode: orphan-index, shard-repair or duplicate-reference.
    #[arg(long)]
    mode: ScanMode,

    /// Namespace to scan.
    #[arg(long, conflicts_with = "all")]
    namespace: Option<String>,

    /// Single collection or edge-meta chain within --namespace.
    #[arg(long, requires = "namespace")]
    structure: Option<String>,

    /// Scan every namespace.
    #[arg(long, default_value_t = false)]
    all: bool,

    /// Shard repair task (required for shard-repair).
    #[arg(long)]
    task: Option<ShardTask>,

    /// Classify and report without writing.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Repoint duplicate references at their canonical target (default: report only).
    #[arg(long, default_value_t = false)]
    merge_duplicates: bool,

    #[arg(long)]
    page_size: Option<usize>,

    /// Targets scanned concurrently.
    #[arg(long)]
    jobs: Option<usize>,

    /// Pause each target after this many pages.
    #[arg(long)]
    max_pages: Option<u64>,

    /// Resume a single target from a cursor printed by an earlier run.
    #[arg(long, requires = "structure")]
    start_cursor: Option<String>,

    /// Keep per-target checkpoints here and resume from them.
    #[arg(long)]
    checkpoint_dir: Option<Utf8PathBuf>,

    /// Oldest index write (epoch ms) eligible for orphan deletion.
    #[arg(long)]
    earliest_ms: Option<i64>,

    /// Newest index write (epoch ms) eligible for orphan deletion.
    #[arg(long, conflicts_with = "seconds_in_past")]
    latest_ms: Option<i64>,

    /// Only delete orphans indexed at least this many seconds ago.
    #[arg(long)]
    seconds_in_past: Option<i64>,

    /// Write the JSON report here.
    #[arg(long)]
    out: Option<Utf8PathBuf>,

    /// Config file (default: ./driftfix.toml if present).
    #[arg(long)]
    config: Option<Utf8PathBuf>,
}

#[derive(Debug, Parser)]
struct ListTargetsArgs {
    #[arg(long)]
    store: Utf8PathBuf,

    #[arg(long)]
    mode: ScanMode,

    /// Only this namespace (default: all).
    #[arg(long)]
    namespace: Option<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help and --version are not errors.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match real_main(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn real_main(cli: Cli) -> anyhow::Result<u8> {
    match cli.cmd {
        Command::Audit(args) => cmd_audit(args),
        Command::ListTargets(args) => cmd_list_targets(args),
    }
}

/// Engine errors carry their own code; anything else is a configuration problem.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<AuditError>()
        .map(AuditError::exit_code)
        .unwrap_or(1)
}

fn cmd_audit(args: AuditArgs) -> anyhow::Result<u8> {
    let cwd = current_dir()?;
    let file_config = config::load_or_default(args.config.as_deref(), &cwd)
        .context("load driftfix.toml config")?;
    let overrides = AuditOverrides {
        page_size: args.page_size,
        jobs: args.jobs,
        checkpoint_dir: args.checkpoint_dir.clone(),
        merge_duplicates: args.merge_duplicates,
        orphans: OrphansConfig {
            seconds_in_past: args.seconds_in_past,
            earliest_ms: args.earliest_ms,
            latest_ms: args.latest_ms,
        },
    };
    let merged = ConfigMerger::new(file_config)
        .merge_audit_args(overrides, Utc::now().timestamp_millis())?;
    debug!(
        "merged config: page_size={}, jobs={}, checkpoint_dir={:?}, merge_duplicates={}, window={:?}",
        merged.page_size, merged.jobs, merged.checkpoint_dir, merged.merge_duplicates, merged.orphan_window
    );

    let scope = audit_scope(&args)?;
    let store = load_snapshot(&args.store)
        .with_context(|| format!("load store snapshot {}", args.store))?;

    let cli_window =
        args.earliest_ms.is_some() || args.latest_ms.is_some() || args.seconds_in_past.is_some();
    let settings = AuditSettings {
        page_size: merged.page_size,
        dry_run: args.dry_run,
        shard_task: args.task,
        // [orphans] from the file is ignored outside orphan-index mode.
        orphan_window: merged
            .orphan_window
            .filter(|_| cli_window || args.mode == ScanMode::OrphanIndex),
        repair_duplicates: merged.merge_duplicates,
        retry: merged.retry,
        max_pages: args.max_pages,
        start_cursor: args.start_cursor.clone().map(PageCursor::new),
        jobs: merged.jobs,
    };

    let checkpoints = merged.checkpoint_dir.map(FsCheckpointStore::new);
    let cancel = CancelToken::new();
    spawn_interrupt_handler(cancel.clone());

    let mut controller = CampaignController::new(&store, settings)
        .with_cancel(cancel)
        .with_tool(ToolInfo {
            name: "driftfix".to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        });
    if let Some(checkpoints) = &checkpoints {
        controller = controller.with_checkpoints(checkpoints);
    }

    let report = controller.run(&scope)?;
    print!("{}", render_report_md(&report));

    if let Some(out) = &args.out {
        write_json(out, &report)?;
        info!("wrote report to {}", out);
    }

    if !args.dry_run && store.mutation_count() > 0 {
        save_snapshot(&args.store, &store)
            .with_context(|| format!("write store snapshot {}", args.store))?;
        info!(mutations = store.mutation_count(), "wrote store snapshot to {}", args.store);
    }

    Ok(if report.any_store_unavailable() {
        2
    } else if report.any_repair_failures() {
        3
    } else {
        0
    })
}

fn cmd_list_targets(args: ListTargetsArgs) -> anyhow::Result<u8> {
    let store = load_snapshot(&args.store)
        .with_context(|| format!("load store snapshot {}", args.store))?;
    let scope = match args.namespace {
        Some(namespace) => CampaignScope::Namespace {
            namespace: Namespace::new(namespace),
            mode: args.mode,
        },
        None => CampaignScope::All { mode: args.mode },
    };
    let resolved = CampaignController::new(&store, AuditSettings::default()).resolve_targets(&scope)?;
    for target in &resolved.targets {
        println!("{}", target);
    }
    for failure in &resolved.catalog_failures {
        warn!("catalog failure: {}", failure);
    }
    Ok(if resolved.catalog_failures.is_empty() { 0 } else { 2 })
}

fn audit_scope(args: &AuditArgs) -> Result<CampaignScope, AuditError> {
    match (&args.namespace, &args.structure, args.all) {
        (Some(ns), Some(structure), _) => Ok(CampaignScope::Target(Target::new(
            ns.as_str(),
            structure.as_str(),
            args.mode,
        ))),
        (Some(ns), None, _) => Ok(CampaignScope::Namespace {
            namespace: Namespace::new(ns.as_str()),
            mode: args.mode,
        }),
        (None, _, true) => Ok(CampaignScope::All { mode: args.mode }),
        (None, _, false) => Err(AuditError::configuration(
            "select targets with --namespace [--structure] or --all",
        )),
    }
}

fn current_dir() -> anyhow::Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("read current directory")?;
    Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| anyhow::anyhow!("current directory is not UTF-8: {}", p.display()))
}

/// Cancel the campaign on Ctrl-C. Runners stop after their current page.
fn spawn_interrupt_handler(cancel: CancelToken) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "interrupt handler unavailable");
                return;
            }
        };
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight pages");
                cancel.cancel();
            }
        });
    });
}

fn write_json<T: serde::Serialize>(path: &Utf8Path, v: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent))?;
        }
    }
    let s = serde_json::to_string_pretty(v).context("serialize json")?;
    fs::write(path, s).with_context(|| format!("write {}", path))?;
    Ok(())
}
