use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::CopyError;

#[derive(Debug, Clone, Default)]
pub struct CopyOutcome {
    /// Paths relative to the destination root, in walk order.
    pub files: Vec<PathBuf>,
    pub overwritten: usize,
    pub dirs_created: usize,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CopyError + '_ {
    move |source| CopyError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Merge `src` into `dst`: files are overwritten (last writer wins), existing
/// directories are kept and merged into, nothing is ever removed wholesale.
///
/// A missing `src` fails before `dst` is created. A mid-copy failure leaves
/// whatever was already written in place.
pub fn merge_copy(src: &Path, dst: &Path) -> Result<CopyOutcome, CopyError> {
    if !src.exists() {
        return Err(CopyError::NotFound {
            path: src.to_path_buf(),
        });
    }
    if !src.is_dir() {
        return Err(CopyError::NotADirectory {
            path: src.to_path_buf(),
        });
    }

    let mut out = CopyOutcome::default();
    if !dst.is_dir() {
        if dst.exists() {
            fs::remove_file(dst).map_err(io_err(dst))?;
        }
        fs::create_dir_all(dst).map_err(io_err(dst))?;
        out.dirs_created += 1;
    }

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|source| CopyError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            if target.is_dir() {
                continue;
            }
            if target.exists() {
                fs::remove_file(&target).map_err(io_err(&target))?;
            }
            fs::create_dir(&target).map_err(io_err(&target))?;
            out.dirs_created += 1;
            continue;
        }

        if target.is_dir() {
            return Err(CopyError::Conflict { path: target });
        }
        if target.exists() {
            out.overwritten += 1;
        }
        fs::copy(entry.path(), &target).map_err(io_err(&target))?;
        out.files.push(rel.to_path_buf());
    }

    Ok(out)
}
