use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::consolidate::ledger::OutcomeRecord;
use crate::consolidate::util::now_epoch_secs;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent<'a> {
    pub at_epoch_secs: u64,
    pub key: &'a str,
    pub status: &'a str,
    pub reason: Option<&'a str>,
    pub archive: Option<&'a Path>,
    pub warnings: usize,
}

pub fn audit_log_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("audit.log")
}

/// Append one JSON line per invoice outcome.
pub fn append_outcome(logs_dir: &Path, record: &OutcomeRecord) -> Result<()> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        key: record.key.as_str(),
        status: record.status.as_str(),
        reason: record.reason.as_deref(),
        archive: record.archive_path.as_deref(),
        warnings: record.warnings,
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = audit_log_path(logs_dir);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
