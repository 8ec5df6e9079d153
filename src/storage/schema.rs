//! Output file layout
//!
//! Column header, default file naming and the RFC-4180 quoting rules used by
//! the CSV sink. Row counting lives here too so that quoted newlines inside a
//! field are never mistaken for row boundaries.

use crate::record::Record;
use chrono::{DateTime, Utc};
use std::io::{self, Write};

/// Field separator
pub const SEPARATOR: char = ',';

/// Prefix of generated output file names
pub const FILE_PREFIX: &str = "catalog_records";

/// Default output file name for a run started at `now`
pub fn default_file_name(now: DateTime<Utc>) -> String {
    format!("{}_{}.csv", FILE_PREFIX, now.format("%Y%m%d_%H%M%S"))
}

/// The header row as written to disk, without the line terminator
pub fn header_line() -> String {
    Record::COLUMNS.join(",")
}

fn needs_quotes(field: &str) -> bool {
    field.contains(SEPARATOR) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Writes one row followed by a newline
pub fn write_row<W: Write>(mut w: W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            write!(w, "{}", SEPARATOR)?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{}", cell)?;
        }
    }
    writeln!(w)
}

/// Splits file contents into logical rows
///
/// Newlines inside quoted fields stay part of their row. Blank lines are
/// dropped.
pub fn split_rows(text: &str) -> Vec<&str> {
    let mut rows = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = text.as_bytes();

    for (idx, &b) in bytes.iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => {
                let row = text[start..idx].trim_end_matches('\r');
                if !row.trim().is_empty() {
                    rows.push(row);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    let tail = text[start..].trim_end_matches('\r');
    if !tail.trim().is_empty() {
        rows.push(tail);
    }

    rows
}

/// Returns true when `line` is the expected header
pub fn is_header(line: &str) -> bool {
    line.trim_start_matches('\u{feff}').trim() == header_line()
}
