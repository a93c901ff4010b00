// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Format-specific readers that turn uploaded bytes into a header row plus
//! data rows of strings. Validation happens upstream in `lib.rs`; this
//! module only decodes.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};
use fanout_core::FanoutError;

/// A decoded tabular file: one header row and its data rows.
#[derive(Debug)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Decode delimited text (CSV). The first record is the header.
///
/// `max_rows` bounds the number of data rows; exceeding it rejects the file.
pub fn read_csv(bytes: &[u8], max_rows: usize) -> Result<Table, FanoutError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let header = reader
        .headers()
        .map_err(|e| FanoutError::InvalidFile {
            reason: format!("unreadable header row: {e}"),
        })?
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| FanoutError::InvalidFile {
            reason: format!("malformed row {}: {e}", rows.len() + 2),
        })?;
        if rows.len() >= max_rows {
            return Err(FanoutError::InvalidFile {
                reason: format!("more than {max_rows} data rows"),
            });
        }
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(Table { header, rows })
}

/// Decode the first worksheet of an XLSX file. The first row is the header.
pub fn read_xlsx(bytes: &[u8], max_rows: usize) -> Result<Table, FanoutError> {
    let mut workbook: Xlsx<_> =
        Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| FanoutError::InvalidFile {
            reason: format!("not a readable xlsx file: {e}"),
        })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| FanoutError::InvalidFile {
            reason: "workbook has no worksheets".to_string(),
        })?
        .map_err(|e| FanoutError::InvalidFile {
            reason: format!("unreadable worksheet: {e}"),
        })?;

    let mut row_iter = range.rows();
    let header = match row_iter.next() {
        Some(cells) => cells.iter().map(cell_to_string).collect::<Vec<_>>(),
        None => {
            return Err(FanoutError::InvalidFile {
                reason: "worksheet is empty".to_string(),
            })
        }
    };

    let mut rows = Vec::new();
    for cells in row_iter {
        if rows.len() >= max_rows {
            return Err(FanoutError::InvalidFile {
                reason: format!("more than {max_rows} data rows"),
            });
        }
        rows.push(cells.iter().map(cell_to_string).collect());
    }

    Ok(Table { header, rows })
}

/// Render a spreadsheet cell as the string a CSV export would contain.
/// Integral floats (how spreadsheets store phone numbers) lose the `.0`.
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{e:?}"),
        Data::Empty => String::new(),
    }
}
