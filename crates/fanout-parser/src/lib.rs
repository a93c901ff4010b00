// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient file ingestion for the fanout engine.
//!
//! Decodes an uploaded CSV or XLSX file into an ordered sequence of
//! validated, E.164-normalized recipient records with optional
//! personalization fields, plus a summary of skipped rows. A pure
//! transform: the caller persists the results.
//!
//! Whole-file rejections (size cap, row cap, missing phone column,
//! undecodable bytes) return [`FanoutError::InvalidFile`]; per-row problems
//! (bad phone, duplicate) are collected as [`SkippedRow`]s and never fail
//! the file.

pub mod phone;
pub mod tabular;

use std::collections::HashMap;
use std::str::FromStr;

use fanout_core::FanoutError;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use fanout_config::model::ParserConfig;

/// Declared format of an uploaded recipient file.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Infer the format from a file name extension, if recognizable.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?;
        Self::from_str(&ext.to_lowercase()).ok()
    }
}

/// One accepted recipient row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRecipient {
    /// Canonical E.164 phone number.
    pub phone: String,
    /// Personalization fields from the remaining columns, in column order.
    pub fields: Vec<(String, String)>,
}

/// One rejected row, with its 1-based data row number and reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
}

/// The result of parsing one file: accepted records in file order plus a
/// rejection summary. Never a silent partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub records: Vec<ParsedRecipient>,
    pub skipped: Vec<SkippedRow>,
}

impl ParseOutcome {
    /// Up to `n` skip reasons for error payloads.
    pub fn sample_reasons(&self, n: usize) -> Vec<String> {
        self.skipped
            .iter()
            .take(n)
            .map(|s| format!("row {}: {}", s.row, s.reason))
            .collect()
    }
}

/// Column headers recognized as the phone column, by substring match.
const PHONE_HEADER_HINTS: [&str; 3] = ["phone", "number", "mobile"];

/// Parse an uploaded recipient file.
///
/// Policy: the phone column is the first header containing "phone",
/// "number", or "mobile" (case-insensitive); a file without one is rejected
/// whole. Duplicate canonical phones collapse to the first occurrence,
/// later ones recorded as skipped. Remaining columns become personalization
/// fields keyed by their header.
pub fn parse_recipients(
    bytes: &[u8],
    format: FileFormat,
    config: &ParserConfig,
) -> Result<ParseOutcome, FanoutError> {
    if bytes.len() > config.max_file_bytes {
        return Err(FanoutError::InvalidFile {
            reason: format!(
                "file is {} bytes, maximum is {}",
                bytes.len(),
                config.max_file_bytes
            ),
        });
    }

    let table = match format {
        FileFormat::Csv => tabular::read_csv(bytes, config.max_rows)?,
        FileFormat::Xlsx => tabular::read_xlsx(bytes, config.max_rows)?,
    };

    let phone_col = find_phone_column(&table.header).ok_or_else(|| FanoutError::InvalidFile {
        reason: format!(
            "no phone column found in header [{}]; expected a column named like `phone`",
            table.header.join(", ")
        ),
    })?;

    let field_cols: Vec<(usize, &str)> = table
        .header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != phone_col)
        .map(|(i, h)| (i, h.as_str()))
        .collect();

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    // canonical phone -> 1-based row of first occurrence
    let mut seen: HashMap<String, usize> = HashMap::new();

    for (idx, row) in table.rows.iter().enumerate() {
        let row_no = idx + 1;
        let raw_phone = row.get(phone_col).map(String::as_str).unwrap_or("");

        let canonical = match phone::normalize(raw_phone) {
            Ok(p) => p,
            Err(reason) => {
                skipped.push(SkippedRow {
                    row: row_no,
                    reason,
                });
                continue;
            }
        };

        if let Some(first) = seen.get(&canonical) {
            skipped.push(SkippedRow {
                row: row_no,
                reason: format!("duplicate of row {first} ({canonical})"),
            });
            continue;
        }
        seen.insert(canonical.clone(), row_no);

        let fields = field_cols
            .iter()
            .filter_map(|&(i, header)| {
                let value = row.get(i).map(String::as_str).unwrap_or("").trim();
                if value.is_empty() {
                    None
                } else {
                    Some((header.to_string(), value.to_string()))
                }
            })
            .collect();

        records.push(ParsedRecipient {
            phone: canonical,
            fields,
        });
    }

    debug!(
        accepted = records.len(),
        skipped = skipped.len(),
        "recipient file parsed"
    );

    Ok(ParseOutcome { records, skipped })
}

fn find_phone_column(header: &[String]) -> Option<usize> {
    header.iter().position(|h| {
        let lower = h.to_lowercase();
        PHONE_HEADER_HINTS.iter().any(|hint| lower.contains(hint))
    })
}
