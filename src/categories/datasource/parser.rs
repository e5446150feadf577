//! Format-specific parsers
//!
//! Each parser turns raw bytes into a [`FileInfo`]: the parsed value together
//! with its inferred [`Type`]. JSON is typed by the general inference rules;
//! CSV is always a `table` whose column types come from the cell text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as JsonValue};

use crate::core::types::{infer_type, Column, Type};

/// Materialized, typed content of one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileInfo {
    /// Inferred type of `data`
    #[serde(rename = "type")]
    pub ty: Type,
    /// Parsed value
    pub data: JsonValue,
}

/// Reasons a file's bytes do not match its declared kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Bytes are not valid UTF-8
    #[error("invalid UTF-8 at byte {valid_up_to}")]
    Utf8 { valid_up_to: usize },

    /// Structurally invalid JSON
    #[error("invalid JSON at line {line}, column {column}: {message}")]
    Json {
        line: usize,
        column: usize,
        message: String,
    },

    /// Structurally invalid CSV
    #[error("invalid CSV: {0}")]
    Csv(String),
}

/// Decode UTF-8 JSON and infer its type
pub fn parse_json(bytes: &[u8]) -> Result<FileInfo, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::Utf8 {
        valid_up_to: e.valid_up_to(),
    })?;
    let data: JsonValue =
        serde_json::from_str(text.trim_start_matches('\u{feff}')).map_err(|e| {
            ParseError::Json {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            }
        })?;
    Ok(FileInfo {
        ty: infer_type(&data),
        data,
    })
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// CSV dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    /// Field delimiter
    pub delimiter: char,
    /// Quote character
    pub quote: char,
    /// Trim whitespace around headers and fields
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            trim: true,
        }
    }
}

/// How a single cell reads
enum Cell {
    Empty,
    Boolean(bool),
    Number(Number),
    Text,
}

fn classify(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Empty;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Cell::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Cell::Boolean(false);
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Cell::Number(Number::from(i));
    }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Cell::Number(n),
        None => Cell::Text,
    }
}

/// Narrowest column type for a set of cells, read as text.
///
/// A column is `number` or `boolean` only when every non-empty cell parses as
/// one; any other mix is `string`, which every cell satisfies.
fn column_type(cells: &[Cell]) -> Type {
    let (mut numbers, mut booleans, mut text) = (false, false, false);
    for cell in cells {
        match cell {
            Cell::Empty => {}
            Cell::Boolean(_) => booleans = true,
            Cell::Number(_) => numbers = true,
            Cell::Text => text = true,
        }
    }
    match (numbers, booleans, text) {
        _ if cells.is_empty() => Type::Any,
        (false, false, false) => Type::Null,
        (true, false, false) => Type::Number,
        (false, true, false) => Type::Boolean,
        _ => Type::String,
    }
}

fn cell_value(cell: &Cell, raw: &str, ty: &Type) -> JsonValue {
    match (cell, ty) {
        (Cell::Empty, _) => JsonValue::Null,
        (Cell::Number(n), Type::Number) => JsonValue::Number(n.clone()),
        (Cell::Boolean(b), Type::Boolean) => JsonValue::Bool(*b),
        _ => JsonValue::String(raw.to_string()),
    }
}

fn ascii_byte(c: char, what: &str) -> Result<u8, ParseError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| ParseError::Csv(format!("{} {:?} is not an ASCII character", what, c)))
}

/// Parse delimited text with a header row into a typed table
pub fn parse_csv(bytes: &[u8], options: &CsvOptions) -> Result<FileInfo, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(ascii_byte(options.delimiter, "delimiter")?)
        .quote(ascii_byte(options.quote, "quote")?)
        .trim(if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        })
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Csv(e.to_string()))?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if h.is_empty() {
                format!("column_{}", i + 1)
            } else {
                h.to_string()
            }
        })
        .collect();

    for (i, name) in headers.iter().enumerate() {
        if headers[..i].contains(name) {
            return Err(ParseError::Csv(format!("duplicate column name '{}'", name)));
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record.map_err(|e| ParseError::Csv(e.to_string()))?);
    }

    let mut columns = Vec::with_capacity(headers.len());
    let mut cells_by_column = Vec::with_capacity(headers.len());
    for (idx, name) in headers.iter().enumerate() {
        let cells: Vec<Cell> = rows
            .iter()
            .map(|row| classify(row.get(idx).unwrap_or("")))
            .collect();
        columns.push(Column::new(name.clone(), column_type(&cells)));
        cells_by_column.push(cells);
    }

    let data = rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let mut obj = Map::new();
            for (c, col) in columns.iter().enumerate() {
                let raw = row.get(c).unwrap_or("");
                obj.insert(
                    col.name.clone(),
                    cell_value(&cells_by_column[c][r], raw, &col.ty),
                );
            }
            JsonValue::Object(obj)
        })
        .collect();

    Ok(FileInfo {
        ty: Type::table(columns),
        data: JsonValue::Array(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_json_table() {
        let info = parse_json(br#"[{"a":1,"b":"x"},{"a":2,"b":"y"}]"#).unwrap();
        assert_eq!(
            info.ty,
            Type::table(vec![
                Column::new("a", Type::Number),
                Column::new("b", Type::String)
            ])
        );
        assert_eq!(info.data, json!([{"a":1,"b":"x"},{"a":2,"b":"y"}]));
    }

    #[test]
    fn test_parse_json_errors() {
        assert_eq!(
            parse_json(&[0x7b, 0xff]),
            Err(ParseError::Utf8 { valid_up_to: 1 })
        );
        let err = parse_json(b"{\"a\": }").unwrap_err();
        assert!(matches!(err, ParseError::Json { line: 1, .. }));
    }

    #[test]
    fn test_parse_json_skips_bom() {
        let info = parse_json("\u{feff}[1,2]".as_bytes()).unwrap();
        assert_eq!(info.ty, Type::array(Type::Number));
    }

    #[test]
    fn test_parse_csv_types_columns() {
        let csv = "id,name,active,score\n1,alice,true,1.5\n2,bob,FALSE,\n3,\"carol, jr\",true,3\n";
        let info = parse_csv(csv.as_bytes(), &CsvOptions::default()).unwrap();

        assert_eq!(
            info.ty,
            Type::table(vec![
                Column::new("id", Type::Number),
                Column::new("name", Type::String),
                Column::new("active", Type::Boolean),
                Column::new("score", Type::Number),
            ])
        );
        assert_eq!(
            info.data,
            json!([
                {"id": 1, "name": "alice", "active": true, "score": 1.5},
                {"id": 2, "name": "bob", "active": false, "score": null},
                {"id": 3, "name": "carol, jr", "active": true, "score": 3},
            ])
        );
    }

    #[test]
    fn test_parse_csv_mixed_column_stays_text() {
        let csv = "code\n007\nabc\n";
        let info = parse_csv(csv.as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(info.ty, Type::table(vec![Column::new("code", Type::String)]));
        assert_eq!(info.data, json!([{"code": "007"}, {"code": "abc"}]));
    }

    #[test]
    fn test_parse_csv_numbers_and_booleans_mix_to_text() {
        let csv = "flag\n1\ntrue\n";
        let info = parse_csv(csv.as_bytes(), &CsvOptions::default()).unwrap();
        assert_eq!(info.ty, Type::table(vec![Column::new("flag", Type::String)]));
        assert_eq!(info.data, json!([{"flag": "1"}, {"flag": "true"}]));
    }

    #[test]
    fn test_parse_csv_custom_delimiter_and_blank_header() {
        let options = CsvOptions {
            delimiter: ';',
            ..Default::default()
        };
        let info = parse_csv(b"a;\n1;x\n", &options).unwrap();
        assert_eq!(
            info.ty,
            Type::table(vec![
                Column::new("a", Type::Number),
                Column::new("column_2", Type::String)
            ])
        );
    }

    #[test]
    fn test_parse_csv_header_only() {
        let info = parse_csv(b"a,b\n", &CsvOptions::default()).unwrap();
        assert_eq!(
            info.ty,
            Type::table(vec![Column::new("a", Type::Any), Column::new("b", Type::Any)])
        );
        assert_eq!(info.data, json!([]));
    }

    #[test]
    fn test_parse_csv_all_empty_column_is_null() {
        let info = parse_csv(b"a,b\n1,\n2,\n", &CsvOptions::default()).unwrap();
        assert_eq!(
            info.ty,
            Type::table(vec![Column::new("a", Type::Number), Column::new("b", Type::Null)])
        );
    }

    #[test]
    fn test_parse_csv_rejects_ragged_rows() {
        let err = parse_csv(b"a,b\n1,2,3\n", &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Csv(_)));
    }

    #[test]
    fn test_parse_csv_rejects_duplicate_headers() {
        let err = parse_csv(b"a,a\n1,2\n", &CsvOptions::default()).unwrap_err();
        assert_eq!(err, ParseError::Csv("duplicate column name 'a'".into()));
    }

    #[test]
    fn test_parse_csv_rejects_non_ascii_delimiter() {
        let options = CsvOptions {
            delimiter: '→',
            ..Default::default()
        };
        assert!(matches!(
            parse_csv(b"a\n1\n", &options),
            Err(ParseError::Csv(_))
        ));
    }
}
