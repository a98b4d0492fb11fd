use anyhow::Result;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::consolidate::archive::{ArchiveOutcome, archive_unit};
use crate::consolidate::artifacts::{NormalizeOutcome, normalize};
use crate::consolidate::audit;
use crate::consolidate::config::Compression;
use crate::consolidate::copier::merge_copy;
use crate::consolidate::ledger::{Ledger, OutcomeRecord};
use crate::consolidate::paths::{InvoiceKey, InvoicePaths, SourceKind, SourceRoots, resolve};
use crate::consolidate::warn::{self, WarnEvent};
use crate::error::{ArchiveError, CopyError, InvoiceError};

pub const INTERRUPTED_REASON: &str = "interrupted before processing";

#[derive(Debug, Clone)]
pub struct InvoiceSuccess {
    pub paths: InvoicePaths,
    pub files_copied: usize,
    pub normalized: NormalizeOutcome,
    pub archive: ArchiveOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub warnings: usize,
    pub interrupted: bool,
}

fn copy_source(paths: &InvoicePaths, kind: SourceKind) -> Result<usize, InvoiceError> {
    match merge_copy(paths.source(kind), paths.destination(kind)) {
        Ok(out) => Ok(out.files.len()),
        Err(CopyError::NotFound { path }) => Err(InvoiceError::SourceNotFound { kind, path }),
        Err(source) => Err(InvoiceError::Copy { kind, source }),
    }
}

fn emit_normalize_warnings(key: &InvoiceKey, out: &NormalizeOutcome) {
    for warning in &out.warnings {
        warn::emit(WarnEvent {
            code: "ARTIFACT_CLEANUP_FAILED",
            stage: "normalize",
            action: warning.action.as_str(),
            key: key.as_str(),
            path: &warning.path.display().to_string(),
            err: &warning.error,
        });
    }
}

/// Consolidate one invoice: copy both sources into its unit, normalize the
/// result artifacts and archive the unit.
///
/// Both sources must be directories before anything is written, so an
/// unresolved source leaves no unit and no archive behind.
pub fn process_invoice(
    roots: &SourceRoots,
    key: &InvoiceKey,
    compression: Compression,
) -> Result<InvoiceSuccess, InvoiceError> {
    let paths = resolve(roots, key);
    for kind in [SourceKind::Support, SourceKind::Package] {
        let src = paths.source(kind);
        if !src.is_dir() {
            return Err(InvoiceError::SourceNotFound {
                kind,
                path: src.to_path_buf(),
            });
        }
    }

    let mut files_copied = copy_source(&paths, SourceKind::Support)?;
    files_copied += copy_source(&paths, SourceKind::Package)?;
    log::debug!("invoice {key}: copied {files_copied} files into {}", paths.unit_dir().display());

    let normalized = normalize(paths.unit_dir(), key);
    emit_normalize_warnings(key, &normalized);

    let archive = archive_unit(paths.unit_dir(), &paths.archive, compression)?;
    Ok(InvoiceSuccess {
        paths,
        files_copied,
        normalized,
        archive,
    })
}

fn outcome_for(key: &InvoiceKey, result: Result<InvoiceSuccess, InvoiceError>) -> OutcomeRecord {
    match result {
        Ok(done) => {
            log::info!(
                "invoice {key}: archived {} entries into {}",
                done.archive.entries.len(),
                done.archive.archive_path.display()
            );
            OutcomeRecord::success(
                key.clone(),
                done.archive.archive_path,
                done.normalized.warnings.len(),
            )
        }
        Err(err) => {
            match &err {
                InvoiceError::Archive(ArchiveError::Cleanup { unit, .. }) => warn::emit(WarnEvent {
                    code: err.code(),
                    stage: "archive",
                    action: "remove-unit",
                    key: key.as_str(),
                    path: &unit.display().to_string(),
                    err: &err.to_string(),
                }),
                _ => log::warn!("invoice {key}: {} {err}", err.code()),
            }
            OutcomeRecord::failure(key.clone(), err.to_string())
        }
    }
}

fn record(ledger: &mut Ledger, audit_dir: Option<&Path>, outcome: OutcomeRecord) -> Result<()> {
    if let Some(dir) = audit_dir
        && let Err(err) = audit::append_outcome(dir, &outcome)
    {
        log::warn!("audit log write failed: {err:#}");
    }
    ledger.record(outcome)
}

/// Process `keys` in order, recording exactly one outcome per key. Once
/// `interrupt` is raised the remaining keys are recorded as failures without
/// being touched.
pub fn run_batch(
    roots: &SourceRoots,
    keys: &[InvoiceKey],
    compression: Compression,
    ledger: &mut Ledger,
    interrupt: &AtomicBool,
    audit_dir: Option<&Path>,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for (idx, key) in keys.iter().enumerate() {
        if ledger.contains(key) {
            continue;
        }
        if interrupt.load(Ordering::SeqCst) {
            if !summary.interrupted {
                log::warn!("interrupted; {} invoices left unprocessed", keys.len() - idx);
            }
            summary.interrupted = true;
            record(ledger, audit_dir, OutcomeRecord::failure(key.clone(), INTERRUPTED_REASON))?;
            continue;
        }

        let outcome = outcome_for(key, process_invoice(roots, key, compression));
        summary.processed += 1;
        record(ledger, audit_dir, outcome)?;
    }

    summary.succeeded = ledger.succeeded();
    summary.failed = ledger.failed();
    summary.warnings = ledger.warnings();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::ledger::OutcomeStatus;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn key(raw: &str) -> InvoiceKey {
        InvoiceKey::parse(raw).unwrap()
    }

    fn write(path: &Path, body: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn roots(base: &Path) -> SourceRoots {
        let roots = SourceRoots {
            support_root: base.join("soportes"),
            package_root: base.join("facturas"),
            staging_root: base.join("salida"),
            output_root: base.join("salida"),
        };
        fs::create_dir_all(&roots.support_root).unwrap();
        fs::create_dir_all(&roots.package_root).unwrap();
        fs::create_dir_all(&roots.output_root).unwrap();
        roots
    }

    fn zip_names(path: &Path) -> Vec<String> {
        let mut zip = zip::ZipArchive::new(fs::File::open(path).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn complete_invoice_becomes_one_archive() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE2001/historia.pdf"), "h");
        write(&roots.support_root.join("FE2001/anexos/orden.pdf"), "o");
        write(&roots.package_root.join("AttachedDocument_F-010-2001/FE2001.xml"), "x");
        write(
            &roots.package_root.join("AttachedDocument_F-010-2001/rips.json"),
            "{}",
        );

        let done = process_invoice(&roots, &key("2001"), Compression::Deflated).unwrap();

        assert_eq!(done.files_copied, 4);
        assert_eq!(done.archive.archive_path, roots.output_root.join("FE2001.zip"));
        assert_eq!(zip_names(&done.archive.archive_path).len(), 4);
        assert!(!roots.output_root.join("FE2001").exists());
    }

    #[test]
    fn missing_package_writes_nothing() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE7/a.pdf"), "a");

        let err = process_invoice(&roots, &key("7"), Compression::Deflated).unwrap_err();

        assert!(matches!(
            err,
            InvoiceError::SourceNotFound {
                kind: SourceKind::Package,
                ..
            }
        ));
        assert!(!roots.output_root.join("FE7").exists());
        assert!(!roots.output_root.join("FE7.zip").exists());
    }

    #[test]
    fn artifacts_are_normalized_before_archiving() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE5000/ResultadosLocales_FE5000.txt"), "l");
        let pkg = roots.package_root.join("AttachedDocument_F-010-5000");
        write(&pkg.join("ResultadosMSPS_FE5000_7_A_CUV.txt"), "cuv");
        write(&pkg.join("ResultadosMSPS_FE5000_ID0_R.txt"), "r");

        let done = process_invoice(&roots, &key("5000"), Compression::Stored).unwrap();

        assert_eq!(
            zip_names(&done.archive.archive_path),
            vec!["ResultadosMSPS_FE5000_7_A_CUV.json"]
        );
    }

    #[test]
    fn batch_records_one_outcome_per_key() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE1/a.pdf"), "a");
        write(&roots.package_root.join("AttachedDocument_F-010-1/b.xml"), "b");
        let logs = tmp.path().join("logs");

        let mut ledger = Ledger::new();
        let summary = run_batch(
            &roots,
            &[key("1"), key("2")],
            Compression::Deflated,
            &mut ledger,
            &AtomicBool::new(false),
            Some(&logs),
        )
        .unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(!summary.interrupted);
        let failed = ledger.failures().map(|r| r.key.as_str()).collect::<Vec<_>>();
        assert_eq!(failed, vec!["2"]);
        let audit = fs::read_to_string(logs.join("audit.log")).unwrap();
        assert_eq!(audit.lines().count(), 2);
    }

    #[test]
    fn interrupt_records_remaining_keys_as_failures() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        let interrupt = AtomicBool::new(true);

        let mut ledger = Ledger::new();
        let summary = run_batch(
            &roots,
            &[key("10"), key("11")],
            Compression::Deflated,
            &mut ledger,
            &interrupt,
            None,
        )
        .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.processed, 0);
        assert_eq!(ledger.records().len(), 2);
        for record in ledger.records() {
            assert_eq!(record.status, OutcomeStatus::Failure);
            assert_eq!(record.reason.as_deref(), Some(INTERRUPTED_REASON));
            assert_eq!(record.archive_path, None::<PathBuf>);
        }
    }

    #[test]
    fn package_that_is_a_file_counts_as_missing() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE7/a.pdf"), "a");
        write(&roots.package_root.join("AttachedDocument_F-010-7"), "not a folder");

        let err = process_invoice(&roots, &key("7"), Compression::Deflated).unwrap_err();

        assert!(matches!(
            err,
            InvoiceError::SourceNotFound {
                kind: SourceKind::Package,
                ..
            }
        ));
        assert_eq!(err.code(), "SOURCE_NOT_FOUND");
        assert!(!roots.output_root.join("FE7").exists());
    }

    #[test]
    fn normalization_warning_keeps_the_invoice_successful() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE8/historia.pdf"), "h");
        let pkg = roots.package_root.join("AttachedDocument_F-010-8");
        write(&pkg.join("ResultadosMSPS_FE8_3_A_CUV.txt"), "cuv");
        fs::create_dir_all(pkg.join("ResultadosMSPS_FE8_3_A_CUV.json")).unwrap();

        let mut ledger = Ledger::new();
        let summary = run_batch(
            &roots,
            &[key("8")],
            Compression::Deflated,
            &mut ledger,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.warnings, 1);
        let record = &ledger.records()[0];
        assert_eq!(record.status, OutcomeStatus::Success);
        assert_eq!(record.warnings, 1);
        let archive = roots.output_root.join("FE8.zip");
        let mut names = zip_names(&archive);
        names.sort();
        assert_eq!(names, vec!["ResultadosMSPS_FE8_3_A_CUV.txt", "historia.pdf"]);
        assert!(!roots.output_root.join("FE8").exists());
    }

    #[test]
    fn copy_error_fails_the_invoice_and_keeps_the_unit() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE9/a.pdf"), "a");
        write(&roots.package_root.join("AttachedDocument_F-010-9/factura.xml"), "x");
        fs::create_dir_all(roots.staging_root.join("FE9/factura.xml")).unwrap();

        let mut ledger = Ledger::new();
        let summary = run_batch(
            &roots,
            &[key("9")],
            Compression::Deflated,
            &mut ledger,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        let reason = ledger.records()[0].reason.clone().unwrap();
        assert!(reason.starts_with("invoice package copy failed"), "{reason}");
        assert!(roots.staging_root.join("FE9/a.pdf").exists());
        assert!(!roots.output_root.join("FE9.zip").exists());
    }

    #[test]
    fn archive_error_fails_the_invoice_and_keeps_the_unit() {
        let tmp = tempdir().unwrap();
        let roots = roots(tmp.path());
        write(&roots.support_root.join("FE10/a.pdf"), "a");
        write(&roots.package_root.join("AttachedDocument_F-010-10/b.xml"), "b");
        // a directory squatting on the archive name makes the final rename fail
        write(&roots.output_root.join("FE10.zip/keep.txt"), "k");

        let mut ledger = Ledger::new();
        let summary = run_batch(
            &roots,
            &[key("10")],
            Compression::Deflated,
            &mut ledger,
            &AtomicBool::new(false),
            None,
        )
        .unwrap();

        assert_eq!(summary.failed, 1);
        let record = &ledger.records()[0];
        assert_eq!(record.status, OutcomeStatus::Failure);
        assert!(record.reason.as_deref().unwrap().starts_with("archive failed"));
        assert!(roots.output_root.join("FE10/a.pdf").exists());
        assert!(roots.output_root.join("FE10/b.xml").exists());
        assert!(roots.output_root.join("FE10.zip").is_dir());
    }
}
