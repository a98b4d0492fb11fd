use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::consolidate::artifacts::{UnitClass, classify_unit};

/// Move each consolidation folder under `root` into the bucket its result
/// files point to. Bucket folders and unclassified folders stay put.
pub fn run(root: &Path, dry_run: bool) -> Result<CommandReport> {
    if !root.is_dir() {
        bail!("classification root not found: {}", root.display());
    }
    let mut report = CommandReport::new("classify");
    report.detail(format!("root={}", root.display()));
    report.detail(format!("dry_run={dry_run}"));

    let buckets = UnitClass::bucket_names();
    let mut units = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if buckets.contains(&name.as_str()) {
            continue;
        }
        units.push((name, entry.path()));
    }
    units.sort();

    let mut moved = 0usize;
    for (name, path) in units {
        let class = match classify_unit(&path) {
            Ok(class) => class,
            Err(err) => {
                report.issue(format!("failed to read {}: {err}", path.display()));
                continue;
            }
        };
        let Some(bucket) = class.bucket() else {
            report.detail(format!("{name} unclassified"));
            continue;
        };

        let target = root.join(bucket).join(&name);
        if dry_run {
            report.detail(format!("{name} -> {bucket} (dry run)"));
            continue;
        }
        if target.exists() {
            report.issue(format!("{name}: {} already exists", target.display()));
            continue;
        }
        let bucket_dir = root.join(bucket);
        fs::create_dir_all(&bucket_dir)
            .with_context(|| format!("failed to create {}", bucket_dir.display()))?;
        match fs::rename(&path, &target) {
            Ok(()) => {
                moved += 1;
                report.detail(format!("{name} -> {bucket}"));
            }
            Err(err) => report.issue(format!("failed to move {name} into {bucket}: {err}")),
        }
    }

    report.detail(format!("moved={moved}"));
    Ok(report)
}
