use anyhow::Result;

use crate::commands::{CommandReport, parse_key};
use crate::consolidate::paths::{RootOverrides, SourceKind, resolve, resolve_roots};

pub fn run(raw_key: &str, overrides: RootOverrides) -> Result<CommandReport> {
    let key = parse_key(raw_key)?;
    let roots = resolve_roots(overrides)?;
    let paths = resolve(&roots, &key);
    let mut report = CommandReport::new("resolve");

    report.detail(format!("key={key}"));
    for kind in [SourceKind::Support, SourceKind::Package] {
        let src = paths.source(kind);
        report.detail(format!("{}_src={}", kind.as_str(), src.display()));
        report.detail(format!("{}_exists={}", kind.as_str(), src.is_dir()));
        if !src.is_dir() {
            report.issue(format!("{kind} not found: {}", src.display()));
        }
    }
    report.detail(format!("unit_dir={}", paths.unit_dir().display()));
    report.detail(format!("archive={}", paths.archive.display()));
    report.detail(format!("archive_exists={}", paths.archive.exists()));
    Ok(report)
}
