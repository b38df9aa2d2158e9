//! Delimited text parsing into [`Row`]s.
//!
//! Uses the `csv` crate so quoted fields may contain delimiters and line
//! breaks. The first record is the header and is always skipped by
//! position; its names are never matched against the column schema.

use std::path::Path;
use std::str::FromStr;

use csv::{ReaderBuilder, Terminator, Trim};
use tracing::debug;

use super::Row;
use crate::error::AppError;

/// UTF-8 BOM bytes.
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Row terminator accepted by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowDelimiter {
    /// Accepts `\r\n`, `\n` and `\r`.
    #[default]
    Auto,
    /// Unix-style line endings (`\n`).
    Lf,
    /// Windows-style line endings (`\r\n`).
    CrLf,
    /// Classic Mac line endings (`\r`).
    Cr,
}

impl RowDelimiter {
    fn terminator(self) -> Terminator {
        match self {
            // The csv crate's CRLF mode already treats `\r`, `\n` and `\r\n` alike.
            RowDelimiter::Auto | RowDelimiter::CrLf => Terminator::CRLF,
            RowDelimiter::Lf => Terminator::Any(b'\n'),
            RowDelimiter::Cr => Terminator::Any(b'\r'),
        }
    }
}

impl FromStr for RowDelimiter {
    type Err = String;

    /// Accepts both literal control characters and their escaped spelling
    /// (`\n`, `\r\n`), since shells rarely pass the former.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(RowDelimiter::Auto),
            "\n" | "\\n" | "lf" => Ok(RowDelimiter::Lf),
            "\r\n" | "\\r\\n" | "crlf" => Ok(RowDelimiter::CrLf),
            "\r" | "\\r" | "cr" => Ok(RowDelimiter::Cr),
            other => Err(format!("unsupported row delimiter '{}'", other.escape_default())),
        }
    }
}

/// Field delimiter and row terminator for one input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularOptions {
    pub delimiter: u8,
    pub row_delimiter: RowDelimiter,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            row_delimiter: RowDelimiter::Auto,
        }
    }
}

/// Parses a single-byte field delimiter such as `,`, `;` or `\t`.
pub fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ => match s.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(format!("delimiter must be a single ASCII character, got '{}'", s)),
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reading
// ─────────────────────────────────────────────────────────────────────────────

/// Parses delimited text into data rows, skipping the header.
///
/// Cells are trimmed and rows may have differing lengths.
///
/// # Errors
///
/// Returns `AppError::CsvInvalid` on malformed quoting or invalid UTF-8
/// inside a record.
pub fn parse_rows(input: &[u8], options: TabularOptions) -> Result<Vec<Row>, AppError> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .delimiter(options.delimiter)
        .terminator(options.row_delimiter.terminator())
        .from_reader(input);

    let mut rows = Vec::new();

    // Skip the first record: it is the header.
    for (index, result) in reader.records().enumerate().skip(1) {
        let record = result.map_err(|e| {
            AppError::CsvInvalid(format!("record {}: {}", index + 1, e))
        })?;
        rows.push(record.iter().collect::<Row>());
    }

    debug!(rows = rows.len(), "Parsed tabular input");
    Ok(rows)
}

/// Reads and parses a file.
///
/// # Errors
///
/// - `AppError::Io` if the file cannot be read
/// - `AppError::NotUtf8` if the file is not UTF-8 encoded
/// - `AppError::CsvInvalid` on parse failures
pub async fn read_rows(path: &Path, options: TabularOptions) -> Result<Vec<Row>, AppError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::Io(format!("{}: {}", path.display(), e)))?;

    if std::str::from_utf8(&bytes).is_err() {
        return Err(AppError::NotUtf8);
    }

    parse_rows(&bytes, options)
}
