//! Delimited text export
//!
//! One header row, then one row per series row. Fields containing the
//! delimiter, a quote or a line break are quoted with inner quotes doubled.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::{check_exportable, ColumnSpec, ExportError};
use crate::analytics::AnalyticsSeries;

/// Export a series as comma-separated text
pub fn to_delimited_text(series: &AnalyticsSeries, columns: &ColumnSpec) -> Result<Vec<u8>, ExportError> {
    to_delimited_text_with(series, columns, b',')
}

/// Export a series with a custom single-byte delimiter
pub fn to_delimited_text_with(
    series: &AnalyticsSeries,
    columns: &ColumnSpec,
    delimiter: u8,
) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    write_delimited(&mut out, series, columns, delimiter)?;
    Ok(out)
}

/// Write a series to a CSV file
pub fn write_csv<P: AsRef<Path>>(
    path: P,
    series: &AnalyticsSeries,
    columns: &ColumnSpec,
) -> Result<(), ExportError> {
    check_exportable(series, columns)?;
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_delimited(&mut writer, series, columns, b',')?;
    writer.flush()?;
    Ok(())
}

fn write_delimited<W: Write>(
    writer: &mut W,
    series: &AnalyticsSeries,
    columns: &ColumnSpec,
    delimiter: u8,
) -> Result<(), ExportError> {
    check_exportable(series, columns)?;
    let delimiter = delimiter as char;

    write_record(writer, columns.headers().into_iter(), delimiter)?;
    for row in &series.rows {
        let cells = columns.cells(row);
        write_record(writer, cells.iter().map(String::as_str), delimiter)?;
    }
    Ok(())
}

fn write_record<'a, W: Write>(
    writer: &mut W,
    fields: impl Iterator<Item = &'a str>,
    delimiter: char,
) -> std::io::Result<()> {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            write!(writer, "{}", delimiter)?;
        }
        if needs_quotes(field, delimiter) {
            write!(writer, "\"{}\"", field.replace('"', "\"\""))?;
        } else {
            write!(writer, "{}", field)?;
        }
    }
    writeln!(writer)
}

fn needs_quotes(field: &str, delimiter: char) -> bool {
    field
        .chars()
        .any(|c| c == delimiter || c == '"' || c == '\n' || c == '\r')
}

/// Parsed delimited text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DelimitedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedTable {
    /// Index of a header
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// All values of one column
    pub fn values(&self, header: &str) -> Option<Vec<&str>> {
        let index = self.column(header)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(index).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }
}

/// Parse delimited text produced by [`to_delimited_text_with`].
///
/// Accepts `\n` or `\r\n` line endings and quoted fields spanning lines.
/// Every record must have as many fields as the header.
pub fn parse_delimited_text(data: &[u8], delimiter: u8) -> Result<DelimitedTable, ExportError> {
    let text = std::str::from_utf8(data).map_err(|e| ExportError::Parse {
        line: 1,
        message: e.to_string(),
    })?;
    let delimiter = delimiter as char;

    let mut records: Vec<(usize, Vec<String>)> = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            '"' => {
                return Err(ExportError::Parse {
                    line,
                    message: "quote inside unquoted field".to_string(),
                })
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push((record_line, std::mem::take(&mut record)));
                line += 1;
                record_line = line;
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExportError::Parse {
            line,
            message: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push((record_line, record));
    }

    let mut records = records.into_iter();
    let Some((_, headers)) = records.next() else {
        return Ok(DelimitedTable::default());
    };

    let mut rows = Vec::new();
    for (line, row) in records {
        if row.len() != headers.len() {
            return Err(ExportError::Parse {
                line,
                message: format!("expected {} fields, found {}", headers.len(), row.len()),
            });
        }
        rows.push(row);
    }

    Ok(DelimitedTable { headers, rows })
}
