use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Summary of the most recent `run`, kept for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunState {
    pub schema_version: u32,
    pub finished_at_epoch_secs: u64,
    pub input: Option<String>,
    pub output_root: Option<String>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub warnings: usize,
    pub interrupted: bool,
    pub failure_report: Option<String>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            finished_at_epoch_secs: 0,
            input: None,
            output_root: None,
            processed: 0,
            succeeded: 0,
            failed: 0,
            warnings: 0,
            interrupted: false,
            failure_report: None,
        }
    }
}

pub fn state_file_path(logs_dir: &Path) -> PathBuf {
    logs_dir.join("last_run.json")
}

pub fn load(logs_dir: &Path) -> Result<Option<RunState>> {
    let file = state_file_path(logs_dir);
    if !file.exists() {
        return Ok(None);
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: RunState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(Some(parsed))
}

pub fn save(logs_dir: &Path, state: &RunState) -> Result<PathBuf> {
    let file = state_file_path(logs_dir);
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create {}", logs_dir.display()))?;
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}
