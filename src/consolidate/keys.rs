use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use std::collections::BTreeSet;
use std::path::Path;

use crate::consolidate::paths::{InvoiceKey, KeyRejection};
use crate::error::ConsolidatorError;

#[derive(Debug, Clone)]
pub struct RejectedCell {
    pub row: usize,
    pub raw: String,
    pub reason: KeyRejection,
}

#[derive(Debug, Clone, Default)]
pub struct KeyLoadOutcome {
    /// First-seen order, duplicates removed.
    pub keys: Vec<InvoiceKey>,
    pub duplicates: usize,
    pub blank: usize,
    pub rejected: Vec<RejectedCell>,
}

impl KeyLoadOutcome {
    fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (usize, String)>,
    {
        let mut out = Self::default();
        let mut seen = BTreeSet::new();
        for (row, raw) in cells {
            match InvoiceKey::parse(&raw) {
                Ok(key) => {
                    if seen.insert(key.clone()) {
                        out.keys.push(key);
                    } else {
                        out.duplicates += 1;
                    }
                }
                Err(KeyRejection::Blank | KeyRejection::NotANumber) => out.blank += 1,
                Err(reason) => out.rejected.push(RejectedCell { row, raw, reason }),
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputFormat {
    Csv,
    Spreadsheet,
}

fn input_format(path: &Path) -> InputFormat {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => InputFormat::Spreadsheet,
        _ => InputFormat::Csv,
    }
}

fn find_column(headers: &[String], column: &str) -> Result<usize, ConsolidatorError> {
    let wanted = column.trim();
    headers
        .iter()
        .position(|header| header.trim() == wanted)
        .ok_or_else(|| ConsolidatorError::MissingColumn {
            column: wanted.to_string(),
            available: headers.iter().map(|h| h.trim().to_string()).collect(),
        })
}

fn read_csv_column(path: &Path, column: &str) -> Result<Vec<(usize, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let headers = reader
        .headers()
        .with_context(|| format!("failed to read header row of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect::<Vec<_>>();
    let idx = find_column(&headers, column)?;

    let mut out = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to parse {}", path.display()))?;
        // header is row 1
        out.push((i + 2, record.get(idx).unwrap_or_default().to_string()));
    }
    Ok(out)
}

/// Render a spreadsheet cell the way an operator typed it. Numeric keys come
/// back as floats, so integral values drop their fraction.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.is_nan() => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn read_sheet_column(path: &Path, column: &str, sheet: Option<&str>) -> Result<Vec<(usize, String)>> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("failed to open {}", path.display()))?;
    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .with_context(|| format!("failed to read sheet `{name}` of {}", path.display()))?,
        None => workbook
            .worksheet_range_at(0)
            .with_context(|| format!("{} has no sheets", path.display()))?
            .with_context(|| format!("failed to read first sheet of {}", path.display()))?,
    };

    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .unwrap_or_default();
    let idx = find_column(&headers, column)?;

    Ok(rows
        .enumerate()
        .map(|(i, row)| (i + 2, row.get(idx).map(cell_text).unwrap_or_default()))
        .collect())
}

pub fn load_keys(path: &Path, column: &str, sheet: Option<&str>) -> Result<KeyLoadOutcome> {
    let cells = match input_format(path) {
        InputFormat::Csv => read_csv_column(path, column)?,
        InputFormat::Spreadsheet => read_sheet_column(path, column, sheet)?,
    };
    Ok(KeyLoadOutcome::from_cells(cells))
}
