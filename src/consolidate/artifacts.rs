use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::consolidate::paths::InvoiceKey;

const MSPS_PREFIX: &str = "ResultadosMSPS_FE";
const LOCAL_PREFIX: &str = "ResultadosLocales_FE";
const VALIDATED_SUFFIX: &str = "_A_CUV.txt";
const REJECTED_SUFFIX: &str = "_ID0_R.txt";
const RESULT_EXT: &str = ".txt";
pub const CANONICAL_EXTENSION: &str = "json";

/// Result artifacts are recognized by file name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// `ResultadosMSPS_FE<key>_<runId>_A_CUV.txt`
    Validated,
    /// `ResultadosMSPS_FE<key>_ID0_R.txt`
    Rejected,
    /// `ResultadosLocales_FE<key>.txt`
    Local,
}

impl ArtifactKind {
    /// Match `name` against the patterns for one specific invoice.
    pub fn for_key(name: &str, key: &InvoiceKey) -> Option<Self> {
        let key = key.as_str();
        if let Some(rest) = name
            .strip_prefix(MSPS_PREFIX)
            .and_then(|rest| rest.strip_prefix(key))
            .and_then(|rest| rest.strip_prefix('_'))
        {
            if rest == &REJECTED_SUFFIX[1..] {
                return Some(Self::Rejected);
            }
            if let Some(run_id) = rest.strip_suffix(VALIDATED_SUFFIX)
                && !run_id.is_empty()
            {
                return Some(Self::Validated);
            }
            return None;
        }
        let local = name
            .strip_prefix(LOCAL_PREFIX)
            .and_then(|rest| rest.strip_prefix(key));
        (local == Some(RESULT_EXT)).then_some(Self::Local)
    }

    /// Match `name` against the patterns for any invoice.
    pub fn for_any_key(name: &str) -> Option<Self> {
        if name.starts_with(MSPS_PREFIX) {
            if name.ends_with(VALIDATED_SUFFIX) {
                return Some(Self::Validated);
            }
            if name.ends_with(REJECTED_SUFFIX) {
                return Some(Self::Rejected);
            }
            return None;
        }
        (name.starts_with(LOCAL_PREFIX) && name.ends_with(RESULT_EXT)).then_some(Self::Local)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    List,
    ReplaceTarget,
    Rename,
    Delete,
}

impl CleanupAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::ReplaceTarget => "replace-target",
            Self::Rename => "rename",
            Self::Delete => "delete",
        }
    }
}

/// Soft failure: logged and counted, never fails the invoice.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactWarning {
    pub path: PathBuf,
    pub action: CleanupAction,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeOutcome {
    pub promoted: Vec<(PathBuf, PathBuf)>,
    pub purged: Vec<PathBuf>,
    pub warnings: Vec<ArtifactWarning>,
}

fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

fn canonical_name(name: &str) -> String {
    let stem = name.strip_suffix(RESULT_EXT).unwrap_or(name);
    format!("{stem}.{CANONICAL_EXTENSION}")
}

fn promote(dir: &Path, name: &str, out: &mut NormalizeOutcome) {
    let from = dir.join(name);
    let to = dir.join(canonical_name(name));
    if to.exists()
        && let Err(err) = fs::remove_file(&to)
    {
        out.warnings.push(ArtifactWarning {
            path: to,
            action: CleanupAction::ReplaceTarget,
            error: err.to_string(),
        });
        return;
    }
    match fs::rename(&from, &to) {
        Ok(()) => out.promoted.push((from, to)),
        Err(err) => out.warnings.push(ArtifactWarning {
            path: from,
            action: CleanupAction::Rename,
            error: err.to_string(),
        }),
    }
}

fn purge(dir: &Path, name: &str, out: &mut NormalizeOutcome) {
    let path = dir.join(name);
    match fs::remove_file(&path) {
        Ok(()) => out.purged.push(path),
        Err(err) => out.warnings.push(ArtifactWarning {
            path,
            action: CleanupAction::Delete,
            error: err.to_string(),
        }),
    }
}

/// Apply the artifact rules to the files at the root of a consolidation unit,
/// in order: promote validated results, purge rejected results, purge local
/// results. Each pass re-lists the directory so it only sees what the
/// previous pass left behind.
pub fn normalize(unit_dir: &Path, key: &InvoiceKey) -> NormalizeOutcome {
    let mut out = NormalizeOutcome::default();
    let passes = [
        ArtifactKind::Validated,
        ArtifactKind::Rejected,
        ArtifactKind::Local,
    ];

    for kind in passes {
        let names = match list_files(unit_dir) {
            Ok(names) => names,
            Err(err) => {
                out.warnings.push(ArtifactWarning {
                    path: unit_dir.to_path_buf(),
                    action: CleanupAction::List,
                    error: err.to_string(),
                });
                return out;
            }
        };
        for name in names
            .iter()
            .filter(|name| ArtifactKind::for_key(name, key) == Some(kind))
        {
            match kind {
                ArtifactKind::Validated => promote(unit_dir, name, &mut out),
                ArtifactKind::Rejected | ArtifactKind::Local => purge(unit_dir, name, &mut out),
            }
        }
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    Validated,
    RejectedLocal,
    RejectedMsps,
    Unclassified,
}

impl UnitClass {
    pub fn bucket(self) -> Option<&'static str> {
        match self {
            Self::Validated => Some("validados y aprobados"),
            Self::RejectedLocal => Some("Rechazados Locales"),
            Self::RejectedMsps => Some("Rechazados MSPS"),
            Self::Unclassified => None,
        }
    }

    pub fn bucket_names() -> [&'static str; 3] {
        ["validados y aprobados", "Rechazados Locales", "Rechazados MSPS"]
    }
}

/// Classify a not-yet-normalized unit by the result files it holds.
pub fn classify_names<S: AsRef<str>>(names: &[S]) -> UnitClass {
    let kinds = names
        .iter()
        .map(|name| ArtifactKind::for_any_key(name.as_ref()))
        .collect::<Vec<_>>();
    if kinds.contains(&Some(ArtifactKind::Validated)) {
        return UnitClass::Validated;
    }

    let has_ext = |ext: &str| {
        names.iter().any(|name| {
            Path::new(name.as_ref())
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        })
    };
    let has_xml = has_ext("xml");
    let has_json = has_ext("json");
    let has_local = kinds.contains(&Some(ArtifactKind::Local));
    let has_rejected = kinds.contains(&Some(ArtifactKind::Rejected));

    match (has_xml && has_json && has_local, has_rejected, names.len()) {
        (true, false, 3) => UnitClass::RejectedLocal,
        (true, true, 4) => UnitClass::RejectedMsps,
        _ => UnitClass::Unclassified,
    }
}

pub fn classify_unit(unit_dir: &Path) -> io::Result<UnitClass> {
    let mut names = Vec::new();
    for entry in fs::read_dir(unit_dir)? {
        names.push(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(classify_names(&names))
}
