// SPDX-FileCopyrightText: 2026 Fanout Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! E.164 phone number normalization.
//!
//! Accepts the formats that show up in real recipient files: optional `+`
//! or `00` international prefix, and separators (spaces, dashes, dots,
//! parentheses) anywhere. Produces the canonical `+<digits>` form.

/// E.164 allows at most 15 digits.
const MAX_DIGITS: usize = 15;
/// Shortest national numbers in use are 7 digits.
const MIN_DIGITS: usize = 7;

/// Normalize a raw phone value to canonical E.164 (`+<digits>`).
///
/// Returns `Err` with a human-readable reason for malformed input.
pub fn normalize(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty phone number".to_string());
    }

    let (rest, had_prefix) = if let Some(r) = trimmed.strip_prefix('+') {
        (r, true)
    } else if let Some(r) = trimmed.strip_prefix("00") {
        (r, true)
    } else {
        (trimmed, false)
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return Err(format!("non-numeric character `{c}` in phone number")),
        }
    }

    if digits.len() < MIN_DIGITS {
        return Err(format!(
            "too short: {} digits (minimum {MIN_DIGITS})",
            digits.len()
        ));
    }
    if digits.len() > MAX_DIGITS {
        return Err(format!(
            "too long: {} digits (maximum {MAX_DIGITS})",
            digits.len()
        ));
    }
    if digits.starts_with('0') {
        // A leading zero is a national trunk prefix; without a country code
        // the number is ambiguous and cannot be dialed internationally.
        let hint = if had_prefix {
            "country code cannot start with 0"
        } else {
            "missing country code"
        };
        return Err(format!("not in international format ({hint})"));
    }

    Ok(format!("+{digits}"))
}
