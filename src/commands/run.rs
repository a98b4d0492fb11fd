use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::commands::CommandReport;
use crate::consolidate::config::{ReportMode, load_config};
use crate::consolidate::keys::load_keys;
use crate::consolidate::ledger::Ledger;
use crate::consolidate::lock::RunLock;
use crate::consolidate::paths::{RootOverrides, SourceRoots, resolve_roots, resolve_tool_paths};
use crate::consolidate::pipeline::run_batch;
use crate::consolidate::state::{self, RunState};
use crate::consolidate::util::now_epoch_secs;
use crate::consolidate::warn::{self, WarnEvent};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input: PathBuf,
    pub column: Option<String>,
    pub sheet: Option<String>,
    pub roots: RootOverrides,
    pub failures: Option<PathBuf>,
    pub reset_failures: bool,
}

fn require_dir(path: &Path, name: &str) -> Result<()> {
    if !path.is_dir() {
        bail!("{name} is not a directory: {}", path.display());
    }
    Ok(())
}

fn prepare_roots(roots: &SourceRoots) -> Result<()> {
    require_dir(&roots.support_root, "support root")?;
    require_dir(&roots.package_root, "package root")?;
    for dir in [&roots.output_root, &roots.staging_root] {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Raise the interrupt flag; `true` once it was already raised, meaning the
/// operator asked twice and the process should stop right away.
fn note_interrupt(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

fn install_interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if note_interrupt(&handler_flag) {
            eprintln!("interrupted twice; exiting without flushing the failure report");
            std::process::exit(130);
        }
        eprintln!("interrupt received; finishing the current invoice (press Ctrl-C again to abort)");
    })
    .context("failed to install interrupt handler")?;
    Ok(flag)
}

pub fn run(opts: RunOptions) -> Result<CommandReport> {
    let tool = resolve_tool_paths()?;
    let cfg = load_config(&tool)?;
    let mut report = CommandReport::new("run");

    if !opts.input.is_file() {
        bail!("input file not found: {}", opts.input.display());
    }
    let roots = resolve_roots(opts.roots)?;
    prepare_roots(&roots)?;
    let lock = RunLock::acquire(&roots.output_root)?;
    log::debug!("holding run lock {}", lock.path().display());

    let column = opts.column.unwrap_or(cfg.input.column);
    let sheet = opts.sheet.or(cfg.input.sheet);
    let loaded = load_keys(&opts.input, &column, sheet.as_deref())
        .with_context(|| format!("failed to load invoice keys from {}", opts.input.display()))?;
    for cell in &loaded.rejected {
        warn::emit(WarnEvent {
            code: "KEY_REJECTED",
            stage: "load",
            action: cell.reason.as_str(),
            key: &cell.raw,
            path: &opts.input.display().to_string(),
            err: &format!("row {}", cell.row),
        });
    }
    log::info!(
        "loaded {} invoice keys from {} (column `{column}`)",
        loaded.keys.len(),
        opts.input.display()
    );

    let mode = if opts.reset_failures {
        ReportMode::Replace
    } else {
        cfg.report.mode
    };
    let report_path = opts
        .failures
        .unwrap_or_else(|| roots.output_root.join(&cfg.report.file_name));

    let interrupt = install_interrupt_flag()?;
    let mut ledger = Ledger::new();
    let summary = run_batch(
        &roots,
        &loaded.keys,
        cfg.archive.compression,
        &mut ledger,
        &interrupt,
        Some(&tool.logs_dir),
    )?;
    let flushed = ledger.flush(&report_path, mode)?;

    let run_state = RunState {
        finished_at_epoch_secs: now_epoch_secs()?,
        input: Some(opts.input.display().to_string()),
        output_root: Some(roots.output_root.display().to_string()),
        processed: summary.processed,
        succeeded: summary.succeeded,
        failed: summary.failed,
        warnings: summary.warnings,
        interrupted: summary.interrupted,
        failure_report: (flushed.rows_written > 0).then(|| report_path.display().to_string()),
        ..RunState::default()
    };
    if let Err(err) = state::save(&tool.logs_dir, &run_state) {
        log::warn!("failed to save run state: {err:#}");
    }

    report.detail(format!("input={}", opts.input.display()));
    report.detail(format!("column={column}"));
    report.detail(format!("keys={}", loaded.keys.len()));
    report.detail(format!("duplicates_skipped={}", loaded.duplicates));
    report.detail(format!("blank_skipped={}", loaded.blank));
    report.detail(format!("keys_rejected={}", loaded.rejected.len()));
    report.detail(format!("output_root={}", roots.output_root.display()));
    report.detail(format!("processed={}", summary.processed));
    report.detail(format!("succeeded={}", summary.succeeded));
    report.detail(format!("failed={}", summary.failed));
    report.detail(format!("warnings={}", summary.warnings));
    report.detail(format!("interrupted={}", summary.interrupted));
    report.detail(format!("failure_report={}", flushed.path.display()));
    report.detail(format!("failure_rows_written={}", flushed.rows_written));
    report.detail(format!("failure_report_mode={}", flushed.mode.as_str()));

    log::info!(
        "run finished: {} succeeded, {} failed, {} warnings",
        summary.succeeded,
        summary.failed,
        summary.warnings
    );
    Ok(report)
}
