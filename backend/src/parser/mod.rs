//! Input adapters: CSV or JSON to [`Row`]s.
//!
//! CSV headers are taken as field names; empty cells are left out of the row.
//! JSON input is an array of objects, the same shape as the HTTP body's `data`.

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{CsvError, CsvResult};
use crate::models::{row_from_json, Row};

/// Candidate delimiters, in order of preference on ties.
const SEPARATORS: [char; 4] = [',', ';', '\t', '|'];

/// Format of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Guess from the file extension; CSV unless it ends in `.json`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

/// Parsed CSV with metadata
#[derive(Debug, Clone)]
pub struct ParsedCsv {
    pub rows: Vec<Row>,
    /// Detected or used delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let mut best = SEPARATORS[0];
    let mut best_count = 0;
    for sep in SEPARATORS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }
    best
}

/// Parse headered CSV.
///
/// # Example
/// ```ignore
/// let parsed = parse_csv("source.ip;source.asn\n127.0.0.1;64496", None)?;
/// assert_eq!(parsed.delimiter, ';');
/// assert_eq!(parsed.rows[0]["source.asn"], "64496");
/// ```
pub fn parse_csv(content: &str, delimiter: Option<char>) -> CsvResult<ParsedCsv> {
    let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(content));
    let delimiter_byte = u8::try_from(delimiter)
        .map_err(|_| CsvError::Shape(format!("delimiter '{}' is not a single byte", delimiter)))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(String::is_empty) {
        return Err(CsvError::NoHeaders);
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, value)| !header.is_empty() && !value.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(ParsedCsv {
        rows,
        delimiter,
        headers,
    })
}

/// Parse a JSON array of objects.
pub fn parse_json_rows(content: &str) -> CsvResult<Vec<Row>> {
    let value: Value = serde_json::from_str(content)?;
    let items = value
        .as_array()
        .ok_or_else(|| CsvError::Shape("expected a JSON array of objects".to_string()))?;

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            item.as_object()
                .map(row_from_json)
                .ok_or_else(|| CsvError::Shape(format!("item {} is not an object", idx)))
        })
        .collect()
}

/// Read rows from a file.
pub fn read_rows_file(path: impl AsRef<Path>, format: Option<InputFormat>) -> CsvResult<Vec<Row>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    match format.unwrap_or_else(|| InputFormat::from_path(path)) {
        InputFormat::Csv => Ok(parse_csv(&content, None)?.rows),
        InputFormat::Json => parse_json_rows(&content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b"), '|');
        assert_eq!(detect_delimiter("single"), ',');
    }

    #[test]
    fn test_parse_csv_skips_empty_cells() {
        let parsed = parse_csv(
            "source.ip;source.fqdn;comment\n127.0.0.1;;\"quoted; text\"\n;;\n",
            None,
        )
        .unwrap();

        assert_eq!(parsed.delimiter, ';');
        assert_eq!(parsed.headers, vec!["source.ip", "source.fqdn", "comment"]);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0]["comment"], "quoted; text");
        assert!(!parsed.rows[0].contains_key("source.fqdn"));
        assert!(parsed.rows[1].is_empty());
    }

    #[test]
    fn test_parse_csv_ragged_rows() {
        let parsed = parse_csv("source.ip,source.asn\n127.0.0.1\n", Some(',')).unwrap();
        assert_eq!(parsed.rows[0].len(), 1);
    }

    #[test]
    fn test_parse_json_rows() {
        let rows = parse_json_rows(r#"[{"source.ip": "127.0.0.1", "source.asn": 1}, {}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["source.asn"], "1");
        assert!(rows[1].is_empty());

        assert!(matches!(parse_json_rows(r#"{"a": 1}"#), Err(CsvError::Shape(_))));
        assert!(matches!(parse_json_rows("[1]"), Err(CsvError::Shape(_))));
    }

    #[test]
    fn test_read_rows_file_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"[{{"source.ip": "127.0.0.1"}}]"#).unwrap();

        let rows = read_rows_file(file.path(), None).unwrap();
        assert_eq!(rows[0]["source.ip"], "127.0.0.1");
    }
}
