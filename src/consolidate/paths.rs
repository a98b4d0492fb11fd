use anyhow::Result;
use serde::Serialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConsolidatorError;

pub const SUPPORT_DIR_PREFIX: &str = "FE";
pub const PACKAGE_DIR_PREFIX: &str = "AttachedDocument_F-010-";
pub const ARCHIVE_EXTENSION: &str = "zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Support,
    Package,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Support => "support",
            Self::Package => "package",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Support => f.write_str("support bundle"),
            Self::Package => f.write_str("invoice package"),
        }
    }
}

/// Invoice identifier taken from the input table. Always non-empty and safe
/// to splice into a single path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct InvoiceKey(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRejection {
    Blank,
    NotANumber,
    UnsafePath,
}

impl KeyRejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blank => "blank",
            Self::NotANumber => "nan",
            Self::UnsafePath => "unsafe-path",
        }
    }
}

impl InvoiceKey {
    pub fn parse(raw: &str) -> Result<Self, KeyRejection> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyRejection::Blank);
        }
        if trimmed.eq_ignore_ascii_case("nan") {
            return Err(KeyRejection::NotANumber);
        }
        if trimmed.contains(['/', '\\'])
            || trimmed.contains("..")
            || trimmed.chars().any(char::is_control)
        {
            return Err(KeyRejection::UnsafePath);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn unit_name(&self) -> String {
        format!("{SUPPORT_DIR_PREFIX}{}", self.0)
    }
}

impl fmt::Display for InvoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRoots {
    pub support_root: PathBuf,
    pub package_root: PathBuf,
    /// Where consolidation units are assembled before archiving.
    pub staging_root: PathBuf,
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoicePaths {
    pub support_src: PathBuf,
    pub package_src: PathBuf,
    pub support_dst: PathBuf,
    pub package_dst: PathBuf,
    pub archive: PathBuf,
}

impl InvoicePaths {
    /// Both destinations name the same consolidation unit.
    pub fn unit_dir(&self) -> &Path {
        &self.package_dst
    }

    pub fn source(&self, kind: SourceKind) -> &Path {
        match kind {
            SourceKind::Support => &self.support_src,
            SourceKind::Package => &self.package_src,
        }
    }

    pub fn destination(&self, kind: SourceKind) -> &Path {
        match kind {
            SourceKind::Support => &self.support_dst,
            SourceKind::Package => &self.package_dst,
        }
    }
}

/// Pure mapping from a key to its source and destination paths; existence is
/// checked by callers.
pub fn resolve(roots: &SourceRoots, key: &InvoiceKey) -> InvoicePaths {
    let unit = roots.staging_root.join(key.unit_name());
    InvoicePaths {
        support_src: roots.support_root.join(key.unit_name()),
        package_src: roots
            .package_root
            .join(format!("{PACKAGE_DIR_PREFIX}{}", key.as_str())),
        support_dst: unit.clone(),
        package_dst: unit,
        archive: roots
            .output_root
            .join(format!("{}.{ARCHIVE_EXTENSION}", key.unit_name())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RootOverrides {
    pub support_root: Option<PathBuf>,
    pub package_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub staging_root: Option<PathBuf>,
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn required_root(
    flag_value: Option<PathBuf>,
    name: &'static str,
    flag: &'static str,
    env_var: &'static str,
) -> Result<PathBuf> {
    flag_value
        .or_else(|| env_path(env_var))
        .ok_or_else(|| {
            ConsolidatorError::MissingRoot {
                name,
                flag,
                env: env_var,
            }
            .into()
        })
}

/// CLI flags win over `CONSOLIDATOR_*_ROOT` variables. Staging defaults to the
/// output root.
pub fn resolve_roots(overrides: RootOverrides) -> Result<SourceRoots> {
    let support_root = required_root(
        overrides.support_root,
        "support root",
        "support-root",
        "CONSOLIDATOR_SUPPORT_ROOT",
    )?;
    let package_root = required_root(
        overrides.package_root,
        "package root",
        "package-root",
        "CONSOLIDATOR_PACKAGE_ROOT",
    )?;
    let output_root = required_root(
        overrides.output_root,
        "output root",
        "output-root",
        "CONSOLIDATOR_OUTPUT_ROOT",
    )?;
    let staging_root = overrides
        .staging_root
        .or_else(|| env_path("CONSOLIDATOR_STAGING_ROOT"))
        .unwrap_or_else(|| output_root.clone());

    Ok(SourceRoots {
        support_root,
        package_root,
        staging_root,
        output_root,
    })
}

#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub home: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

pub fn resolve_tool_paths() -> Result<ToolPaths> {
    let home = match env_path("CONSOLIDATOR_HOME") {
        Some(home) => home,
        None => required_home_dir()?.join(".invoice-consolidator"),
    };
    let logs_dir = env_path("CONSOLIDATOR_LOGS_DIR").unwrap_or_else(|| home.join("logs"));
    Ok(ToolPaths { home, logs_dir })
}
