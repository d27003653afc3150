//! Minimal CSV reading and writing for the import/export endpoints.
//!
//! Handles quoted fields (embedded commas, doubled quotes, line breaks), `\r\n`
//! line endings and a leading UTF-8 BOM.

use std::collections::HashMap;

/// A parsed row. `line` is the 1-based line the row starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRecord {
    pub line: usize,
    pub fields: Vec<String>,
}

impl CsvRecord {
    /// Trimmed field at `idx`, empty when the row is short.
    pub fn get(&self, idx: usize) -> &str {
        self.fields.get(idx).map(|f| f.trim()).unwrap_or("")
    }

    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Parses `text` into records, skipping blank lines. An unterminated quote runs to
/// the end of the input.
pub fn parse(text: &str) -> Vec<CsvRecord> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                fields.push(std::mem::take(&mut field));
                let record = CsvRecord {
                    line: record_line,
                    fields: std::mem::take(&mut fields),
                };
                if !record.is_blank() {
                    records.push(record);
                }
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        let record = CsvRecord {
            line: record_line,
            fields,
        };
        if !record.is_blank() {
            records.push(record);
        }
    }
    records
}

/// Header
///
/// Column lookup by (case-insensitive, trimmed) header name.
#[derive(Debug, Clone)]
pub struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    pub fn new(record: &CsvRecord) -> Self {
        let columns = record
            .fields
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.trim().to_ascii_lowercase(), idx))
            .collect();
        Self { columns }
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    /// Names from `required` missing in the header.
    pub fn missing<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.columns.contains_key(**name))
            .copied()
            .collect()
    }

    /// Field `name` of `record`, empty when the column is absent.
    pub fn field<'r>(&self, record: &'r CsvRecord, name: &str) -> &'r str {
        self.index(name).map(|idx| record.get(idx)).unwrap_or("")
    }
}

/// Quotes a field when it contains a separator, quote or line break.
pub fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// CsvWriter
///
/// Accumulates `\r\n`-terminated rows into a string.
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
}

impl CsvWriter {
    pub fn with_header(columns: &[&str]) -> Self {
        let mut writer = Self::default();
        writer.row(columns);
        writer
    }

    pub fn row<S: AsRef<str>>(&mut self, fields: &[S]) {
        let line = fields
            .iter()
            .map(|f| escape_field(f.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        self.out.push_str(&line);
        self.out.push_str("\r\n");
    }

    pub fn finish(self) -> String {
        self.out
    }
}
