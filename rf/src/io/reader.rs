//! Uploaded files into [`Workbook`]s

use std::io::Cursor;
use std::path::{Path, PathBuf};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use csv::{ByteRecord, ReaderBuilder};
use tracing::{debug, info, warn};

use super::IoError;
use crate::table::{Sheet, Value, Workbook, parse_date_text};

/// Sheet name given to the single sheet of a csv upload
pub const CSV_SHEET: &str = "Sheet1";

/// Parse an uploaded file
///
/// `name` is the upload's file name; its extension picks the parser. Files
/// ending in `.csv` are read as a single sheet, everything else goes through
/// calamine (xlsx, xlsm, xlsb, xls, ods).
pub fn read_workbook(name: &str, bytes: Vec<u8>) -> Result<Workbook, IoError> {
    debug!(%name, size = bytes.len(), "read_workbook: called");
    let is_csv = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    let workbook = if is_csv {
        Workbook::new(name, vec![read_csv(name, &bytes)?])
    } else {
        read_spreadsheet(name, bytes)?
    };

    info!(%name, sheets = workbook.sheets.len(), "Read workbook");
    Ok(workbook)
}

/// Read a workbook from disk
pub fn read_workbook_file(path: &Path) -> Result<Workbook, IoError> {
    debug!(?path, "read_workbook_file: called");
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    read_workbook(&name, bytes)
}

/// Read several files concurrently, keeping their order
///
/// Parsing is CPU-bound and runs on the blocking pool. The first failure is
/// returned once every read has finished.
pub async fn load_workbooks(paths: &[PathBuf]) -> Result<Vec<Workbook>, IoError> {
    debug!(count = paths.len(), "load_workbooks: called");
    let handles: Vec<_> = paths
        .iter()
        .cloned()
        .map(|path| tokio::task::spawn_blocking(move || read_workbook_file(&path)))
        .collect();

    let mut workbooks = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for handle in handles {
        let result = handle.await.map_err(|e| IoError::Task(e.to_string())).and_then(|r| r);
        match result {
            Ok(workbook) => workbooks.push(workbook),
            Err(e) => {
                warn!(error = %e, "load_workbooks: read failed");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(workbooks),
    }
}

fn read_spreadsheet(name: &str, bytes: Vec<u8>) -> Result<Workbook, IoError> {
    let mut source = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| IoError::Spreadsheet {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    let mut sheets = Vec::new();
    for sheet_name in source.sheet_names().to_owned() {
        let range = source.worksheet_range(&sheet_name).map_err(|e| IoError::Spreadsheet {
            name: name.to_string(),
            message: format!("sheet {}: {}", sheet_name, e),
        })?;

        // Ranges start at the first used cell; pad back to A1 so row
        // numbers match what the user sees.
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<Value>> = vec![Vec::new(); row_offset as usize];
        for row in range.rows() {
            let mut cells = vec![Value::Blank; col_offset as usize];
            cells.extend(row.iter().map(convert_cell));
            rows.push(cells);
        }
        debug!(sheet = %sheet_name, rows = rows.len(), "read_spreadsheet: loaded sheet");
        sheets.push(Sheet::new(sheet_name, rows));
    }

    Ok(Workbook::new(name, sheets))
}

fn convert_cell(data: &Data) -> Value {
    match data {
        Data::Empty | Data::Error(_) => Value::Blank,
        Data::Bool(v) => Value::text(if *v { "TRUE" } else { "FALSE" }),
        Data::Int(v) => Value::Number(*v as f64),
        Data::Float(v) => Value::Number(*v),
        Data::String(s) if s.is_empty() => Value::Blank,
        Data::String(s) => Value::text(s.clone()),
        Data::DateTime(dt) => dt.as_datetime().map(Value::Date).unwrap_or(Value::Number(dt.as_f64())),
        Data::DateTimeIso(s) => parse_date_text(s).map(Value::Date).unwrap_or_else(|| Value::text(s.clone())),
        Data::DurationIso(s) => Value::text(s.clone()),
    }
}

fn read_csv(name: &str, bytes: &[u8]) -> Result<Sheet, IoError> {
    let mut reader = ReaderBuilder::new().has_headers(false).flexible(true).from_reader(bytes);

    let mut record = ByteRecord::new();
    let mut rows = Vec::new();
    loop {
        let more = reader.read_byte_record(&mut record).map_err(|e| IoError::Csv {
            name: name.to_string(),
            source: e,
        })?;
        if !more {
            break;
        }
        let first = rows.is_empty();
        let cells = record
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                let raw = if first && i == 0 { strip_bom(raw) } else { raw };
                csv_value(&decode_field(raw))
            })
            .collect();
        rows.push(cells);
    }

    Ok(Sheet::new(CSV_SHEET, rows))
}

fn strip_bom(raw: &[u8]) -> &[u8] {
    raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw)
}

/// UTF-8 with a Latin-1 fallback for exports from older tools
fn decode_field(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    }
}

/// Numbers become numeric cells; codes with leading zeros stay text
fn csv_value(field: &str) -> Value {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Value::Blank;
    }
    let leading_zero = trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0.");
    if !leading_zero
        && let Ok(n) = trimmed.parse::<f64>()
        && n.is_finite()
    {
        return Value::Number(n);
    }
    Value::text(field)
}
