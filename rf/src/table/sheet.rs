//! Workbooks, sheets and the tables cut out of them

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::value::Value;

/// One worksheet as a raw grid
///
/// `rows[0]` is spreadsheet row 1. Rows may be ragged; missing cells read as
/// blank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Value>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Header cells of the table starting at 1-based `start_row`
    ///
    /// Returns `None` when the sheet has no such row.
    pub fn header(&self, start_row: usize) -> Option<Vec<String>> {
        if start_row == 0 {
            return None;
        }
        let row = self.rows.get(start_row - 1)?;
        Some(trim_trailing_blanks(row).iter().map(Value::to_text).collect())
    }

    /// Cut the table whose header sits on 1-based `start_row`
    ///
    /// Data rows follow the header. Rows where every cell is blank are
    /// skipped, every data row is padded or truncated to the header width.
    pub fn table(&self, start_row: usize) -> Option<InputTable> {
        debug!(sheet = %self.name, start_row, "Sheet::table: called");
        let header = self.header(start_row)?;
        let width = header.len();

        let rows = self.rows[start_row..]
            .iter()
            .filter(|row| row.iter().any(|v| !v.is_blank()))
            .map(|row| {
                let mut cells: Vec<Value> = row.iter().take(width).cloned().collect();
                cells.resize(width, Value::Blank);
                cells
            })
            .collect();

        Some(InputTable { header, rows })
    }
}

fn trim_trailing_blanks(row: &[Value]) -> &[Value] {
    let end = row.iter().rposition(|v| !v.is_blank()).map(|i| i + 1).unwrap_or(0);
    &row[..end]
}

/// Result of picking a sheet out of a workbook
#[derive(Debug, Clone, Copy)]
pub struct SheetSelection<'a> {
    pub sheet: &'a Sheet,
    /// True when the preferred name was not present and the first sheet was used
    pub fell_back: bool,
}

/// An uploaded spreadsheet file, fully loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    /// File label used in messages (usually the upload's file name)
    pub name: String,
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new(name: impl Into<String>, sheets: Vec<Sheet>) -> Self {
        Self {
            name: name.into(),
            sheets,
        }
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Whether a sheet with exactly this name exists
    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheets.iter().any(|s| s.name == name)
    }

    /// Pick the sheet a stage reads
    ///
    /// Exact-name match on `preferred`, otherwise the first sheet. An empty
    /// preferred name never matches, so it always means "first sheet".
    /// Inspection reports through this same function, so a preview never
    /// disagrees with a run.
    pub fn select_sheet(&self, preferred: &str) -> Option<SheetSelection<'_>> {
        debug!(workbook = %self.name, %preferred, "Workbook::select_sheet: called");
        if let Some(sheet) = self.sheets.iter().find(|s| s.name == preferred) {
            return Some(SheetSelection {
                sheet,
                fell_back: false,
            });
        }
        self.sheets.first().map(|sheet| SheetSelection { sheet, fell_back: true })
    }
}

/// Table read from an input sheet: literal header plus positional rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl InputTable {
    pub fn new(header: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { header, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Table produced by a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl OutputTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Treat an input table as an output table, keeping literal header names
    pub fn from_input(input: InputTable) -> Self {
        Self {
            columns: input.header,
            rows: input.rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name (first occurrence)
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, top to bottom
    pub fn column_values(&self, column: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| r.get(idx).unwrap_or(&Value::Blank)).collect())
    }

    /// Remove a column from the column list and from every row
    pub fn remove_column(&mut self, column: &str) -> bool {
        let Some(idx) = self.column_index(column) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }

    /// Append a column with the given values, padding with blanks
    pub fn push_column(&mut self, column: impl Into<String>, values: Vec<Value>) {
        self.columns.push(column.into());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    /// True when every cell of the column is blank
    pub fn is_column_blank(&self, idx: usize) -> bool {
        self.rows.iter().all(|r| r.get(idx).is_none_or(Value::is_blank))
    }

    /// Stack tables vertically, aligning columns by normalized name
    ///
    /// Output columns are the normalized names in first-seen order; a table
    /// lacking a column contributes blanks. Within one table only the first
    /// of several columns normalizing to the same name is kept.
    pub fn concat(tables: impl IntoIterator<Item = OutputTable>, normalize: impl Fn(&str) -> String) -> OutputTable {
        let mut out = OutputTable::default();
        for table in tables {
            let mut positions: Vec<Option<usize>> = vec![None; out.columns.len()];
            for (src, name) in table.columns.iter().enumerate() {
                let name = normalize(name);
                let dst = match out.column_index(&name) {
                    Some(i) => i,
                    None => {
                        out.push_column(name, Vec::new());
                        positions.push(None);
                        out.columns.len() - 1
                    }
                };
                if positions[dst].is_none() {
                    positions[dst] = Some(src);
                }
            }
            for row in table.rows {
                out.rows.push(
                    positions
                        .iter()
                        .map(|p| p.and_then(|i| row.get(i)).cloned().unwrap_or_default())
                        .collect(),
                );
            }
        }
        out
    }
}

/// An output table with the sheet name it is written under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedTable {
    pub name: String,
    pub table: OutputTable,
}

impl NamedTable {
    pub fn new(name: impl Into<String>, table: OutputTable) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }
}
