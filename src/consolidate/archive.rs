use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::consolidate::config::Compression;
use crate::consolidate::paths::ARCHIVE_EXTENSION;
use crate::error::ArchiveError;

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub archive_path: PathBuf,
    pub entries: Vec<String>,
    pub bytes: u64,
}

fn entry_options(compression: Compression) -> SimpleFileOptions {
    let method = match compression {
        Compression::Deflated => CompressionMethod::Deflated,
        Compression::Stored => CompressionMethod::Stored,
    };
    // Fixed metadata keeps re-runs byte-identical.
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Entry name relative to the unit root, always `/`-separated.
fn entry_name(unit_dir: &Path, path: &Path) -> Result<String, ArchiveError> {
    let invalid = || ArchiveError::InvalidEntryName {
        path: path.to_path_buf(),
    };
    let rel = path.strip_prefix(unit_dir).map_err(|_| invalid())?;
    let mut parts = Vec::new();
    for component in rel.components() {
        parts.push(component.as_os_str().to_str().ok_or_else(invalid)?);
    }
    Ok(parts.join("/"))
}

fn collect_files(unit_dir: &Path) -> Result<Vec<(String, PathBuf)>, ArchiveError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(unit_dir)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| ArchiveError::Walk {
            path: unit_dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry_name(unit_dir, entry.path())?;
        files.push((name, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn write_entries(
    file: &mut File,
    files: &[(String, PathBuf)],
    compression: Compression,
    archive_path: &Path,
) -> Result<(), ArchiveError> {
    let zip_err = |source| ArchiveError::Zip {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut writer = ZipWriter::new(file);
    for (name, path) in files {
        writer
            .start_file(name.as_str(), entry_options(compression))
            .map_err(zip_err)?;
        let mut input = File::open(path).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
        io::copy(&mut input, &mut writer).map_err(|source| ArchiveError::Io {
            path: path.clone(),
            source,
        })?;
    }
    writer.finish().map_err(zip_err)?;
    Ok(())
}

/// Compress `unit_dir` into `archive_path`, then remove `unit_dir`.
///
/// The archive is staged in a temporary file next to `archive_path` and only
/// renamed into place after it is finished and synced. On any failure the
/// temporary file is dropped and `unit_dir` stays on disk. If the unit cannot
/// be removed the persisted archive is withdrawn again, so an invoice never
/// ends up both archived and failed.
pub fn archive_unit(
    unit_dir: &Path,
    archive_path: &Path,
    compression: Compression,
) -> Result<ArchiveOutcome, ArchiveError> {
    archive_unit_with(unit_dir, archive_path, compression, |unit| {
        fs::remove_dir_all(unit)
    })
}

fn archive_unit_with(
    unit_dir: &Path,
    archive_path: &Path,
    compression: Compression,
    remove_unit: impl FnOnce(&Path) -> io::Result<()>,
) -> Result<ArchiveOutcome, ArchiveError> {
    if !unit_dir.is_dir() {
        return Err(ArchiveError::MissingUnit {
            path: unit_dir.to_path_buf(),
        });
    }
    let io_err = |source| ArchiveError::Io {
        path: archive_path.to_path_buf(),
        source,
    };

    let files = collect_files(unit_dir)?;
    let parent = archive_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let stem = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archive");
    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{stem}-"))
        .suffix(".partial")
        .tempfile_in(parent)
        .map_err(io_err)?;

    write_entries(staged.as_file_mut(), &files, compression, archive_path)?;
    staged.as_file().sync_all().map_err(io_err)?;
    let bytes = staged.as_file().metadata().map_err(io_err)?.len();
    staged
        .persist(archive_path)
        .map_err(|err| io_err(err.error))?;

    if let Err(source) = remove_unit(unit_dir) {
        if let Err(err) = fs::remove_file(archive_path) {
            log::warn!(
                "failed to withdraw archive {}: {err}",
                archive_path.display()
            );
        }
        return Err(ArchiveError::Cleanup {
            archive: archive_path.to_path_buf(),
            unit: unit_dir.to_path_buf(),
            source,
        });
    }

    Ok(ArchiveOutcome {
        archive_path: archive_path.to_path_buf(),
        entries: files.into_iter().map(|(name, _)| name).collect(),
        bytes,
    })
}

/// Name an archive takes when it is sent again: `FE1.zip` becomes
/// `FE1_1.zip`, `FE1_1.zip` becomes `FE1_2.zip`. `None` for non-archives.
pub fn resubmission_name(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION) || stem.is_empty() {
        return None;
    }
    let next = match stem.rsplit_once('_') {
        Some((base, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{base}_{}", n.parse::<u64>().ok()?.checked_add(1)?)
        }
        _ => format!("{stem}_1"),
    };
    Some(format!("{next}.{ext}"))
}

/// Current resubmission counter of an archive name, `0` when it has none.
pub fn resubmission_count(file_name: &str) -> u64 {
    file_name
        .rsplit_once('.')
        .and_then(|(stem, _)| stem.rsplit_once('_'))
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}
