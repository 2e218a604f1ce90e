//! Stage output tables into an xlsx file

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use rust_xlsxwriter::{Color, ExcelDateTime, Format, FormatBorder, Workbook as XlsxWorkbook};
use tracing::debug;

use super::IoError;
use crate::table::{NamedTable, Value};

const MIN_COLUMN_WIDTH: usize = 10;
const MAX_COLUMN_WIDTH: usize = 50;

/// Years an xlsx date serial can hold
const EXCEL_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// First day readers report for a time-only cell (serials below 1)
const TIME_ONLY_FROM: Option<NaiveDate> = NaiveDate::from_ymd_opt(1899, 12, 30);

/// Render tables as one xlsx workbook, one sheet per table in order
///
/// Headers are bold on a shaded background, dates use `dd-mm-yyyy`, and a
/// column whose data cells are all blank is filled black with white text.
pub fn write_tables(tables: &[NamedTable]) -> Result<Vec<u8>, IoError> {
    debug!(tables = tables.len(), "write_tables: called");
    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xDCE6F1))
        .set_border(FormatBorder::Thin);
    let date_format = Format::new().set_num_format("dd-mm-yyyy");
    let time_format = Format::new().set_num_format("hh:mm:ss");
    let blank_format = Format::new()
        .set_background_color(Color::Black)
        .set_font_color(Color::White);

    let mut workbook = XlsxWorkbook::new();
    for named in tables {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&named.name)?;

        let table = &named.table;
        for (col, name) in table.columns.iter().enumerate() {
            let col = col_num(col)?;
            worksheet.write_string_with_format(0, col, name, &header_format)?;
        }

        for (r, row) in table.rows.iter().enumerate() {
            let row_num = row_num(r + 1)?;
            for (c, value) in row.iter().enumerate() {
                let col = col_num(c)?;
                match value {
                    Value::Blank => {}
                    Value::Text(s) => {
                        worksheet.write_string(row_num, col, s)?;
                    }
                    Value::Number(n) => {
                        worksheet.write_number(row_num, col, *n)?;
                    }
                    Value::Date(dt) => match excel_cell(dt)? {
                        ExcelCell::Date(excel) => {
                            worksheet.write_datetime_with_format(row_num, col, &excel, &date_format)?;
                        }
                        ExcelCell::Time(excel) => {
                            worksheet.write_datetime_with_format(row_num, col, &excel, &time_format)?;
                        }
                        ExcelCell::Text(text) => {
                            worksheet.write_string(row_num, col, text)?;
                        }
                    },
                }
            }
        }

        for (c, name) in table.columns.iter().enumerate() {
            let col = col_num(c)?;
            if table.is_column_blank(c) {
                worksheet.set_column_format(col, &blank_format)?;
                worksheet.set_column_width(col, MIN_COLUMN_WIDTH as f64)?;
                continue;
            }
            let widest = table
                .rows
                .iter()
                .filter_map(|row| row.get(c))
                .map(|v| v.to_text().chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0);
            let width = (widest + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH);
            worksheet.set_column_width(col, width as f64)?;
        }
    }

    let bytes = workbook.save_to_buffer()?;
    debug!(size = bytes.len(), "write_tables: rendered workbook");
    Ok(bytes)
}

enum ExcelCell {
    Date(ExcelDateTime),
    Time(ExcelDateTime),
    Text(String),
}

/// Dates outside the xlsx range are written as a time of day or as text
fn excel_cell(dt: &NaiveDateTime) -> Result<ExcelCell, IoError> {
    if dt.year() < 1900 && TIME_ONLY_FROM.is_some_and(|from| dt.date() >= from) {
        let time = ExcelDateTime::from_hms(dt.hour() as u16, dt.minute() as u8, dt.second())?;
        return Ok(ExcelCell::Time(time));
    }
    if !EXCEL_YEARS.contains(&dt.year()) {
        debug!(%dt, "excel_cell: date outside xlsx range, writing text");
        return Ok(ExcelCell::Text(Value::Date(*dt).to_text()));
    }
    let date = ExcelDateTime::from_ymd(dt.year() as u16, dt.month() as u8, dt.day() as u8)?.and_hms(
        dt.hour() as u16,
        dt.minute() as u8,
        dt.second(),
    )?;
    Ok(ExcelCell::Date(date))
}

fn row_num(index: usize) -> Result<u32, IoError> {
    u32::try_from(index).map_err(|_| IoError::TooLarge(format!("row {}", index)))
}

fn col_num(index: usize) -> Result<u16, IoError> {
    u16::try_from(index).map_err(|_| IoError::TooLarge(format!("column {}", index)))
}
