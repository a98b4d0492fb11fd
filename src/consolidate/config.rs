use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::consolidate::paths::ToolPaths;
use crate::error::ConsolidatorError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub column: String,
    pub sheet: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            column: "Factura".to_string(),
            sheet: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Append,
    Replace,
}

impl ReportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Replace => "replace",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "append" => Some(Self::Append),
            "replace" | "reset" => Some(Self::Replace),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub file_name: String,
    pub mode: ReportMode,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            file_name: "facturas_no_encontradas.csv".to_string(),
            mode: ReportMode::Append,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Deflated,
    Stored,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deflated => "deflated",
            Self::Stored => "stored",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deflated" | "deflate" => Some(Self::Deflated),
            "stored" | "none" => Some(Self::Stored),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub compression: Compression,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            compression: Compression::Deflated,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsolidatorConfig {
    pub input: InputConfig,
    pub report: ReportConfig,
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct PartialConsolidatorConfig {
    input: Option<InputConfig>,
    report: Option<ReportConfig>,
    archive: Option<ArchiveConfig>,
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_parsed<T>(var: &str, fallback: T, parse: fn(&str) -> Option<T>) -> Result<T> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => {
            parse(&v).ok_or_else(|| anyhow!(ConsolidatorError::InvalidConfig(format!("{var}={v}"))))
        }
        _ => Ok(fallback),
    }
}

fn validate(cfg: &ConsolidatorConfig) -> Result<()> {
    if cfg.input.column.trim().is_empty() {
        return Err(ConsolidatorError::InvalidConfig("input column cannot be empty".into()).into());
    }
    if cfg
        .input
        .sheet
        .as_deref()
        .is_some_and(|sheet| sheet.trim().is_empty())
    {
        return Err(ConsolidatorError::InvalidConfig("input sheet cannot be blank".into()).into());
    }
    let file_name = cfg.report.file_name.trim();
    if file_name.is_empty() {
        return Err(
            ConsolidatorError::InvalidConfig("report file name cannot be empty".into()).into(),
        );
    }
    if file_name.contains(['/', '\\']) {
        return Err(ConsolidatorError::InvalidConfig(
            "report file name must not contain path separators; use --failures for a full path"
                .into(),
        )
        .into());
    }
    Ok(())
}

pub fn config_path(tool: &ToolPaths) -> PathBuf {
    if let Ok(custom) = env::var("CONSOLIDATOR_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    tool.home.join("consolidator.toml")
}

fn merge_file_config(base: &mut ConsolidatorConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
    let parsed: PartialConsolidatorConfig = toml::from_str(&raw).map_err(|err| {
        ConsolidatorError::InvalidConfig(format!("{}: {err}", path.display()))
    })?;
    if let Some(input) = parsed.input {
        base.input = input;
    }
    if let Some(report) = parsed.report {
        base.report = report;
    }
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    Ok(())
}

pub fn load_config(tool: &ToolPaths) -> Result<ConsolidatorConfig> {
    let mut cfg = ConsolidatorConfig::default();
    merge_file_config(&mut cfg, &config_path(tool))?;

    cfg.input.column = env_or_string("CONSOLIDATOR_INPUT_COLUMN", &cfg.input.column);
    cfg.input.sheet = env_optional_string("CONSOLIDATOR_INPUT_SHEET", cfg.input.sheet.take());
    cfg.report.file_name = env_or_string("CONSOLIDATOR_REPORT_FILE", &cfg.report.file_name);
    cfg.report.mode = env_or_parsed("CONSOLIDATOR_REPORT_MODE", cfg.report.mode, ReportMode::parse)?;
    cfg.archive.compression = env_or_parsed(
        "CONSOLIDATOR_ARCHIVE_COMPRESSION",
        cfg.archive.compression,
        Compression::parse,
    )?;

    validate(&cfg)?;
    Ok(cfg)
}
