use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::consolidate::config::ReportMode;
use crate::consolidate::paths::InvoiceKey;

pub const REPORT_HEADER: [&str; 2] = ["Factura", "Motivo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    pub key: InvoiceKey,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub archive_path: Option<PathBuf>,
    pub warnings: usize,
}

impl OutcomeRecord {
    pub fn success(key: InvoiceKey, archive_path: PathBuf, warnings: usize) -> Self {
        Self {
            key,
            status: OutcomeStatus::Success,
            reason: None,
            archive_path: Some(archive_path),
            warnings,
        }
    }

    pub fn failure(key: InvoiceKey, reason: impl Into<String>) -> Self {
        Self {
            key,
            status: OutcomeStatus::Failure,
            reason: Some(reason.into()),
            archive_path: None,
            warnings: 0,
        }
    }
}

fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[derive(Debug, Clone)]
pub struct FlushOutcome {
    pub path: PathBuf,
    pub rows_written: usize,
    pub mode: ReportMode,
}

/// Per-run outcome ledger. Holds one record per key and is the only writer of
/// the failure report.
#[derive(Debug, Default)]
pub struct Ledger {
    records: Vec<OutcomeRecord>,
    seen: BTreeSet<InvoiceKey>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: OutcomeRecord) -> Result<()> {
        if !self.seen.insert(outcome.key.clone()) {
            bail!("outcome for invoice {} already recorded", outcome.key);
        }
        self.records.push(outcome);
        Ok(())
    }

    pub fn records(&self) -> &[OutcomeRecord] {
        &self.records
    }

    pub fn contains(&self, key: &InvoiceKey) -> bool {
        self.seen.contains(key)
    }

    pub fn failures(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.records
            .iter()
            .filter(|r| r.status == OutcomeStatus::Failure)
    }

    pub fn succeeded(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == OutcomeStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    pub fn warnings(&self) -> usize {
        self.records.iter().map(|r| r.warnings).sum()
    }

    /// Write the failure rows to `path`. In append mode an existing report
    /// keeps its rows and header; in replace mode it is rewritten, and removed
    /// when there is nothing to report.
    pub fn flush(&self, path: &Path, mode: ReportMode) -> Result<FlushOutcome> {
        let rows = self
            .failures()
            .map(|r| [r.key.as_str(), r.reason.as_deref().unwrap_or_default()])
            .collect::<Vec<_>>();
        let out = FlushOutcome {
            path: path.to_path_buf(),
            rows_written: rows.len(),
            mode,
        };

        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if rows.is_empty() {
            if mode == ReportMode::Replace && path.exists() {
                fs::remove_file(path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
            return Ok(out);
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let append = mode == ReportMode::Append && has_content;
        // A report saved without a final newline would glue the first new row
        // onto its last row.
        let needs_newline = append
            && !ends_with_newline(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        if needs_newline {
            file.write_all(b"\n")
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);
        if !append {
            writer.write_record(REPORT_HEADER)?;
        }
        for row in &rows {
            writer
                .write_record(row)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(raw: &str) -> InvoiceKey {
        InvoiceKey::parse(raw).unwrap()
    }

    fn sample() -> Ledger {
        let mut ledger = Ledger::new();
        ledger
            .record(OutcomeRecord::success(key("2001"), PathBuf::from("FE2001.zip"), 1))
            .unwrap();
        ledger
            .record(OutcomeRecord::failure(key("2002"), "support bundle not found: /s/FE2002"))
            .unwrap();
        ledger
    }

    #[test]
    fn one_record_per_key() {
        let mut ledger = sample();
        let err = ledger
            .record(OutcomeRecord::failure(key("2001"), "again"))
            .unwrap_err();
        assert!(err.to_string().contains("already recorded"));
        assert_eq!(ledger.records().len(), 2);
        assert_eq!(ledger.succeeded(), 1);
        assert_eq!(ledger.failed(), 1);
        assert_eq!(ledger.warnings(), 1);
    }

    #[test]
    fn flush_writes_only_failures_with_header() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("fallas.csv");

        let out = sample().flush(&report, ReportMode::Append).unwrap();

        assert_eq!(out.rows_written, 1);
        let raw = fs::read_to_string(&report).unwrap();
        assert_eq!(
            raw,
            "Factura,Motivo\n2002,support bundle not found: /s/FE2002\n"
        );
    }

    #[test]
    fn append_mode_keeps_earlier_rows() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("fallas.csv");

        sample().flush(&report, ReportMode::Append).unwrap();
        sample().flush(&report, ReportMode::Append).unwrap();

        let raw = fs::read_to_string(&report).unwrap();
        assert_eq!(raw.matches("Factura,Motivo").count(), 1);
        assert_eq!(raw.matches("2002,").count(), 2);
        assert!(!raw.contains("2001"));
    }

    #[test]
    fn append_after_report_without_trailing_newline() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("fallas.csv");
        fs::write(&report, "Factura,Motivo\n1,old").unwrap();

        let mut ledger = Ledger::new();
        ledger.record(OutcomeRecord::failure(key("2"), "x")).unwrap();
        ledger.flush(&report, ReportMode::Append).unwrap();

        assert_eq!(
            fs::read_to_string(&report).unwrap(),
            "Factura,Motivo\n1,old\n2,x\n"
        );
    }

    #[test]
    fn replace_mode_rewrites_and_removes_when_clean() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("fallas.csv");

        sample().flush(&report, ReportMode::Append).unwrap();
        sample().flush(&report, ReportMode::Replace).unwrap();
        let raw = fs::read_to_string(&report).unwrap();
        assert_eq!(raw.matches("2002,").count(), 1);

        Ledger::new().flush(&report, ReportMode::Replace).unwrap();
        assert!(!report.exists());
    }

    #[test]
    fn clean_run_does_not_create_a_report() {
        let tmp = tempdir().unwrap();
        let report = tmp.path().join("fallas.csv");
        let mut ledger = Ledger::new();
        ledger
            .record(OutcomeRecord::success(key("1"), PathBuf::from("FE1.zip"), 0))
            .unwrap();

        let out = ledger.flush(&report, ReportMode::Append).unwrap();
        assert_eq!(out.rows_written, 0);
        assert!(!report.exists());
    }
}
