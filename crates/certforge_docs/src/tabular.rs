use calamine::{Data, DataType, Reader, open_workbook_auto};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::dates::format_canonical;
use crate::error::{ForgeError, Result};

/// One cell as read from a source, before display coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::DateTime(_) => false,
        }
    }

    /// Empty string, the text as-is, or the canonical date.
    pub fn into_display(self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s,
            Self::DateTime(dt) => format_canonical(dt.date()),
        }
    }
}

/// One data row keyed by header name, in header order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    index: usize,
    source_row: usize,
    fields: Vec<(String, String)>,
}

impl Record {
    /// Build a record directly from `(header, value)` pairs. Later duplicates
    /// of a header replace the earlier value.
    pub fn from_pairs<H, V>(index: usize, pairs: impl IntoIterator<Item = (H, V)>) -> Self
    where
        H: Into<String>,
        V: Into<String>,
    {
        let mut record = Self {
            index,
            source_row: index + 2,
            fields: Vec::new(),
        };
        for (header, value) in pairs {
            record.set(header.into(), value.into());
        }
        record
    }

    fn set(&mut self, header: String, value: String) {
        match self.fields.iter_mut().find(|(h, _)| *h == header) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((header, value)),
        }
    }

    /// Zero-based position in the dataset.
    pub fn index(&self) -> usize {
        self.index
    }

    /// 1-based row number in the source file.
    pub fn source_row(&self) -> usize {
        self.source_row
    }

    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Headers plus records from one extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    source: PathBuf,
    headers: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    /// Assemble a dataset from records built elsewhere.
    pub fn from_records(
        source: impl Into<PathBuf>,
        headers: Vec<String>,
        records: Vec<Record>,
    ) -> Self {
        Self {
            source: source.into(),
            headers,
            records,
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at a zero-based index.
    pub fn record(&self, index: usize) -> Result<&Record> {
        self.records.get(index).ok_or(ForgeError::RecordIndex {
            index,
            count: self.records.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Read a spreadsheet or CSV file into header-keyed records.
///
/// The first row supplies the headers, up to the first blank header cell.
/// Fully blank data rows are skipped; short rows are padded with empty
/// strings; cells past the header list are dropped.
pub fn extract_records(path: &Path) -> Result<Dataset> {
    let rows = read_rows(path)?;
    let dataset = build_dataset(path, rows)?;
    debug!(
        "Processed {} records from {} ({} headers)",
        dataset.len(),
        path.display(),
        dataset.headers.len()
    );
    Ok(dataset)
}

/// Just the header row of a source.
pub fn read_headers(path: &Path) -> Result<Vec<String>> {
    let mut rows = read_rows(path)?.into_iter();
    let first = rows.next().ok_or_else(|| no_rows(path))?;
    Ok(header_row(first))
}

pub(crate) fn build_dataset(path: &Path, rows: Vec<Vec<CellValue>>) -> Result<Dataset> {
    let mut rows = rows.into_iter();
    let headers = header_row(rows.next().ok_or_else(|| no_rows(path))?);
    if headers.is_empty() {
        warn!("First row of {} has no header cells", path.display());
    }

    let mut records = Vec::new();
    for (offset, row) in rows.enumerate() {
        // offset 0 is sheet row 2
        let source_row = offset + 2;
        if row.iter().all(CellValue::is_blank) {
            debug!("Skipping blank row {source_row}");
            continue;
        }

        let mut record = Record {
            index: records.len(),
            source_row,
            fields: Vec::with_capacity(headers.len()),
        };
        let mut cells = row.into_iter();
        for header in &headers {
            let value = cells.next().unwrap_or(CellValue::Empty).into_display();
            record.set(header.clone(), value);
        }
        records.push(record);
    }

    Ok(Dataset {
        source: path.to_path_buf(),
        headers,
        records,
    })
}

fn header_row(row: Vec<CellValue>) -> Vec<String> {
    row.into_iter()
        .take_while(|cell| !cell.is_blank())
        .map(CellValue::into_display)
        .collect()
}

fn no_rows(path: &Path) -> ForgeError {
    ForgeError::DataExtraction {
        path: path.to_path_buf(),
        reason: "source contains no rows".into(),
    }
}

fn read_rows(path: &Path) -> Result<Vec<Vec<CellValue>>> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => read_delimited_rows(path, b','),
        "tsv" => read_delimited_rows(path, b'\t'),
        _ => read_spreadsheet_rows(path),
    }
}

fn extraction_error(path: &Path, reason: impl std::fmt::Display) -> ForgeError {
    ForgeError::DataExtraction {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Spreadsheets (xlsx / xls / ods) via calamine
// ---------------------------------------------------------------------------

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<CellValue>>> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| extraction_error(path, format!("failed to open workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| extraction_error(path, "workbook has no worksheets"))?
        .map_err(|e| extraction_error(path, format!("failed to read worksheet: {e}")))?;

    let rows = range
        .rows()
        .map(|row| row.iter().map(cell_from_sheet).collect())
        .collect();
    Ok(anchor_at_a1(rows, range.start().unwrap_or((0, 0))))
}

/// calamine trims a sheet to its used range; put leading blank rows and
/// columns back so row 1 stays the header row.
fn anchor_at_a1(rows: Vec<Vec<CellValue>>, (top, left): (u32, u32)) -> Vec<Vec<CellValue>> {
    let padded = rows.into_iter().map(|row| {
        let mut cells = vec![CellValue::Empty; left as usize];
        cells.extend(row);
        cells
    });
    std::iter::repeat_with(Vec::new)
        .take(top as usize)
        .chain(padded)
        .collect()
}

fn cell_from_sheet(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Text(i.to_string()),
        Data::Float(f) => CellValue::Text(display_float(*f)),
        Data::Bool(b) => CellValue::Text(if *b { "True" } else { "False" }.into()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_datetime() {
            Some(dt) => CellValue::DateTime(dt),
            None => CellValue::Text(cell.to_string()),
        },
        other => CellValue::Text(other.to_string()),
    }
}

/// Whole numbers print without a fractional part; spreadsheets store every
/// number as a float.
fn display_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

// ---------------------------------------------------------------------------
// Delimited text via csv
// ---------------------------------------------------------------------------

fn read_delimited_rows(path: &Path, delimiter: u8) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| extraction_error(path, format!("failed to open file: {e}")))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| extraction_error(path, format!("failed to read record: {e}")))?;
        let row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                if field.is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        rows.push(row);
    }

    // Excel-exported CSVs often start with a byte-order mark.
    if let Some(CellValue::Text(first)) = rows.first_mut().and_then(|r| r.first_mut()) {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }

    Ok(rows)
}
