use anyhow::{Context, Result};
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::consolidate::util::now_epoch_secs;
use crate::error::ConsolidatorError;

pub const LOCK_FILE: &str = ".consolidator.lock";

#[derive(Debug, Serialize)]
struct LockPayload<'a> {
    pid: u32,
    build_uuid: &'a str,
    started_at_epoch_secs: u64,
}

/// Exclusive lock on an output root; released and removed on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(output_root: &Path) -> Result<Self> {
        let path = output_root.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            return Err(ConsolidatorError::RunLocked { path }.into());
        }

        let payload = LockPayload {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID"),
            started_at_epoch_secs: now_epoch_secs()?,
        };
        file.set_len(0)?;
        file.write_all(serde_json::to_string(&payload)?.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}
