use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::consolidate::paths::SourceKind;

/// Setup failures that stop a run before any invoice is touched.
#[derive(Debug, Error)]
pub enum ConsolidatorError {
    #[error("config invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("{name} is not configured; pass --{flag} or set {env}")]
    MissingRoot {
        name: &'static str,
        flag: &'static str,
        env: &'static str,
    },
    #[error("column `{column}` not found in input; available columns: {}", available.join(", "))]
    MissingColumn {
        column: String,
        available: Vec<String>,
    },
    #[error("another run holds the lock {}", path.display())]
    RunLocked { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("source directory not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("source is not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },
    #[error("destination {} is a directory where the source has a file", path.display())]
    Conflict { path: PathBuf },
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("failed to copy into {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("consolidation folder not found: {}", path.display())]
    MissingUnit { path: PathBuf },
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("entry name is not valid UTF-8: {}", path.display())]
    InvalidEntryName { path: PathBuf },
    #[error("failed to write archive {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to compress into {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{} could not be removed, archive {} withdrawn: {source}", unit.display(), archive.display())]
    Cleanup {
        archive: PathBuf,
        unit: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Terminal failure for a single invoice. Never aborts the batch.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error("{kind} not found: {}", path.display())]
    SourceNotFound { kind: SourceKind, path: PathBuf },
    #[error("{kind} copy failed: {source}")]
    Copy {
        kind: SourceKind,
        #[source]
        source: CopyError,
    },
    #[error("archive failed: {0}")]
    Archive(#[from] ArchiveError),
}

impl InvoiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            Self::Copy { .. } => "COPY_FAILED",
            Self::Archive(ArchiveError::Cleanup { .. }) => "UNIT_CLEANUP_FAILED",
            Self::Archive(_) => "ARCHIVE_FAILED",
        }
    }
}
