use anyhow::{Context, Result, bail};
use std::cmp::Reverse;
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::consolidate::archive::{resubmission_count, resubmission_name};

/// Bump the resubmission counter of every archive directly under `root`.
/// Higher counters move first so `FE1.zip` never lands on a live `FE1_1.zip`.
pub fn run(root: &Path, dry_run: bool) -> Result<CommandReport> {
    if !root.is_dir() {
        bail!("archive root not found: {}", root.display());
    }
    let mut report = CommandReport::new("rename-archives");
    report.detail(format!("root={}", root.display()));
    report.detail(format!("dry_run={dry_run}"));

    let mut plan = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(next) = resubmission_name(&name) {
            plan.push((name, next));
        }
    }
    plan.sort_by_key(|(name, _)| (Reverse(resubmission_count(name)), name.clone()));

    if plan.is_empty() {
        report.detail("no archives to rename");
    }
    let mut renamed = 0usize;
    for (name, next) in plan {
        if dry_run {
            report.detail(format!("{name} -> {next} (dry run)"));
            continue;
        }
        let target = root.join(&next);
        if target.exists() {
            report.issue(format!("{name}: {} already exists", target.display()));
            continue;
        }
        match fs::rename(root.join(&name), &target) {
            Ok(()) => {
                renamed += 1;
                report.detail(format!("{name} -> {next}"));
            }
            Err(err) => report.issue(format!("failed to rename {name}: {err}")),
        }
    }

    report.detail(format!("renamed={renamed}"));
    Ok(report)
}
