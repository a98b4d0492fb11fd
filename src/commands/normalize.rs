use anyhow::{Result, bail};
use std::path::Path;

use crate::commands::{CommandReport, parse_key};
use crate::consolidate::artifacts::normalize;

pub fn run(dir: &Path, raw_key: &str) -> Result<CommandReport> {
    let key = parse_key(raw_key)?;
    if !dir.is_dir() {
        bail!("consolidation folder not found: {}", dir.display());
    }
    let mut report = CommandReport::new("normalize");
    report.detail(format!("dir={}", dir.display()));

    let out = normalize(dir, &key);
    for (from, to) in &out.promoted {
        report.detail(format!("promoted {} -> {}", from.display(), to.display()));
    }
    for path in &out.purged {
        report.detail(format!("deleted {}", path.display()));
    }
    for warning in &out.warnings {
        report.issue(format!(
            "{} failed for {}: {}",
            warning.action.as_str(),
            warning.path.display(),
            warning.error
        ));
    }
    if out.promoted.is_empty() && out.purged.is_empty() && out.warnings.is_empty() {
        report.detail(format!("no result artifacts for invoice {key}"));
    }
    Ok(report)
}
