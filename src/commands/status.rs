use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::consolidate::config::{config_path, load_config};
use crate::consolidate::paths::{RootOverrides, resolve_roots, resolve_tool_paths};
use crate::consolidate::state;

include!(concat!(env!("OUT_DIR"), "/consolidator_env_allowlist.rs"));

fn unknown_env_keys() -> Vec<String> {
    let mut keys = env::vars_os()
        .filter_map(|(key, _)| key.into_string().ok())
        .filter(|key| key.starts_with("CONSOLIDATOR_"))
        .filter(|key| !GENERATED_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect::<Vec<_>>();
    keys.sort();
    keys
}

pub fn run(overrides: RootOverrides) -> Result<CommandReport> {
    let tool = resolve_tool_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));
    report.detail(format!("home={}", tool.home.display()));
    report.detail(format!("logs_dir={}", tool.logs_dir.display()));
    let cfg_file = config_path(&tool);
    report.detail(format!(
        "config_path={} (exists={})",
        cfg_file.display(),
        cfg_file.exists()
    ));

    match load_config(&tool) {
        Ok(cfg) => {
            report.detail(format!("input_column={}", cfg.input.column));
            if let Some(sheet) = &cfg.input.sheet {
                report.detail(format!("input_sheet={sheet}"));
            }
            report.detail(format!("report_file={}", cfg.report.file_name));
            report.detail(format!("report_mode={}", cfg.report.mode.as_str()));
            report.detail(format!(
                "archive_compression={}",
                cfg.archive.compression.as_str()
            ));
        }
        Err(err) => report.issue(format!("{err:#}")),
    }

    match resolve_roots(overrides) {
        Ok(roots) => {
            for (name, path) in [
                ("support_root", &roots.support_root),
                ("package_root", &roots.package_root),
                ("staging_root", &roots.staging_root),
                ("output_root", &roots.output_root),
            ] {
                report.detail(format!("{name}={} (exists={})", path.display(), path.is_dir()));
            }
        }
        Err(err) => report.detail(format!("roots unresolved: {err}")),
    }

    match state::load(&tool.logs_dir) {
        Ok(Some(last)) => {
            report.detail(format!("last_run_at_epoch_secs={}", last.finished_at_epoch_secs));
            report.detail(format!(
                "last_run processed={} succeeded={} failed={} warnings={} interrupted={}",
                last.processed, last.succeeded, last.failed, last.warnings, last.interrupted
            ));
            if let Some(path) = last.failure_report {
                report.detail(format!("last_run_failure_report={path}"));
            }
        }
        Ok(None) => report.detail("last_run=none"),
        Err(err) => report.issue(format!("{err:#}")),
    }

    for key in unknown_env_keys() {
        report.issue(format!("unknown environment variable {key}"));
    }
    Ok(report)
}
