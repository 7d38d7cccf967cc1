//! CSV ⇄ JSON.
//!
//! ## Type inference
//!
//! Each column gets one type, decided over its non-empty cells:
//! integer, then float, then boolean, then (only when a date format was
//! requested) date, else text. Empty cells are `null` whatever the type.
//!
//! ## Row labels
//!
//! Rows are labelled `0, 1, 2, …` in source order. Orientations keyed by
//! row (`columns`, `index`) use the label as a string key; `split` lists
//! them as numbers.

use crate::attempt::{OutputCheck, Strategy};
use crate::backends::write_file;
use crate::config::{DateFormat, Orient, TabularOptions};
use crate::error::StrategyError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const CSV_INPUTS: &[&str] = &["csv", "tsv", "txt"];
pub const JSON_INPUTS: &[&str] = &["json"];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];

// ── Reading ──────────────────────────────────────────────────────────────

/// A parsed table: unique headers and rectangular string rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Make header names unique (`a`, `a.1`, `a.2`) and name blank ones.
fn normalise_headers(raw: &[String]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.iter()
        .enumerate()
        .map(|(i, h)| {
            let base = if h.trim().is_empty() {
                format!("Unnamed: {i}")
            } else {
                h.clone()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

/// Read delimited text from `path`.
///
/// Short rows are padded with empty cells; a row with more fields than the
/// header is an error.
pub fn read_table(path: &Path, delimiter: u8) -> Result<Table, StrategyError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .map_err(StrategyError::backend)?;

    let mut raw_headers: Vec<String> = reader
        .headers()
        .map_err(StrategyError::backend)?
        .iter()
        .map(str::to_string)
        .collect();
    if let Some(first) = raw_headers.first_mut() {
        if let Some(stripped) = first.strip_prefix('\u{feff}') {
            *first = stripped.to_string();
        }
    }
    let headers = normalise_headers(&raw_headers);
    let width = headers.len();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(StrategyError::backend)?;
        if record.len() > width {
            return Err(StrategyError::backend(format!(
                "row {} has {} fields, header has {}",
                i + 2,
                record.len(),
                width
            )));
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    debug!("Read {} rows × {} columns", rows.len(), width);
    Ok(Table { headers, rows })
}

// ── Type inference ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Boolean,
    Date,
    Text,
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Decimal notation only: `inf`, `NaN` and friends stay text.
fn parse_float(s: &str) -> Option<f64> {
    let numeric = s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if !numeric || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parse the date shapes found in real-world CSV exports.
pub fn parse_date(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Infer one column's type from its cells.
pub fn infer_kind<'a>(
    cells: impl Iterator<Item = &'a str>,
    detect_dates: bool,
) -> ColumnKind {
    let mut values = cells.map(str::trim).filter(|c| !c.is_empty()).peekable();
    if values.peek().is_none() {
        return ColumnKind::Text;
    }
    let values: Vec<&str> = values.collect();

    if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnKind::Integer
    } else if values.iter().all(|v| parse_float(v).is_some()) {
        ColumnKind::Float
    } else if values.iter().all(|v| parse_bool(v).is_some()) {
        ColumnKind::Boolean
    } else if detect_dates && values.iter().all(|v| parse_date(v).is_some()) {
        ColumnKind::Date
    } else {
        ColumnKind::Text
    }
}

fn typed_value(cell: &str, kind: ColumnKind, date_format: Option<DateFormat>) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match kind {
        ColumnKind::Integer => trimmed
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(cell.to_string())),
        ColumnKind::Float => parse_float(trimmed)
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ColumnKind::Boolean => parse_bool(trimmed).map(Value::Bool).unwrap_or(Value::Null),
        ColumnKind::Date => match (parse_date(trimmed), date_format) {
            (Some(dt), Some(DateFormat::Iso)) => {
                Value::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            }
            (Some(dt), Some(DateFormat::Epoch)) => Value::from(dt.and_utc().timestamp_millis()),
            _ => Value::String(cell.to_string()),
        },
        ColumnKind::Text => Value::String(cell.to_string()),
    }
}

/// Convert every cell to a typed JSON value, column by column.
pub fn typed_rows(table: &Table, date_format: Option<DateFormat>) -> Vec<Vec<Value>> {
    let kinds: Vec<ColumnKind> = (0..table.headers.len())
        .map(|c| {
            infer_kind(
                table.rows.iter().map(|r| r[c].as_str()),
                date_format.is_some(),
            )
        })
        .collect();
    debug!("Column kinds: {:?}", kinds);

    table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .zip(&kinds)
                .map(|(cell, kind)| typed_value(cell, *kind, date_format))
                .collect()
        })
        .collect()
}

// ── Shaping ──────────────────────────────────────────────────────────────

/// Arrange typed rows in the requested orientation.
pub fn shape(headers: &[String], rows: Vec<Vec<Value>>, orient: Orient) -> Value {
    match orient {
        Orient::Records => Value::Array(
            rows.into_iter()
                .map(|row| Value::Object(headers.iter().cloned().zip(row).collect()))
                .collect(),
        ),
        Orient::Values => Value::Array(rows.into_iter().map(Value::Array).collect()),
        Orient::Index => Value::Object(
            rows.into_iter()
                .enumerate()
                .map(|(i, row)| {
                    (
                        i.to_string(),
                        Value::Object(headers.iter().cloned().zip(row).collect()),
                    )
                })
                .collect(),
        ),
        Orient::Columns => {
            let mut columns: Vec<Map<String, Value>> = vec![Map::new(); headers.len()];
            for (i, row) in rows.into_iter().enumerate() {
                for (c, value) in row.into_iter().enumerate() {
                    columns[c].insert(i.to_string(), value);
                }
            }
            Value::Object(
                headers
                    .iter()
                    .cloned()
                    .zip(columns.into_iter().map(Value::Object))
                    .collect(),
            )
        }
        Orient::Split => {
            let mut out = Map::new();
            out.insert(
                "columns".into(),
                Value::Array(headers.iter().cloned().map(Value::String).collect()),
            );
            out.insert(
                "index".into(),
                Value::Array((0..rows.len()).map(Value::from).collect()),
            );
            out.insert(
                "data".into(),
                Value::Array(rows.into_iter().map(Value::Array).collect()),
            );
            Value::Object(out)
        }
    }
}

/// Serialise with `indent` spaces, or compactly for `None`/`Some(0)`.
pub fn to_json_bytes(value: &Value, indent: Option<usize>) -> Result<Vec<u8>, StrategyError> {
    let mut buf = Vec::new();
    match indent {
        Some(n) if n > 0 => {
            let pad = " ".repeat(n);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            value.serialize(&mut ser).map_err(StrategyError::backend)?;
        }
        _ => serde_json::to_writer(&mut buf, value).map_err(StrategyError::backend)?,
    }
    buf.push(b'\n');
    Ok(buf)
}

/// CSV → JSON with `csv` + `serde_json`.
pub struct CsvToJsonStrategy {
    options: TabularOptions,
}

impl CsvToJsonStrategy {
    pub fn new(options: TabularOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for CsvToJsonStrategy {
    fn name(&self) -> &str {
        "csv"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let table = read_table(&source, options.delimiter)?;
            let rows = typed_rows(&table, options.date_format);
            let row_count = rows.len();
            let value = shape(&table.headers, rows, options.orient);
            write_file(&staging, &to_json_bytes(&value, options.indent)?)?;
            info!(
                "Wrote {} rows as {:?} JSON",
                row_count, options.orient
            );
            Ok::<(), StrategyError>(())
        })
        .await
        .map_err(|e| StrategyError::backend(format!("CSV task panicked: {e}")))?
    }

    fn output_check(&self) -> OutputCheck {
        OutputCheck::Json
    }
}

// ── JSON → CSV ───────────────────────────────────────────────────────────

/// Text for one CSV cell.
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// Column order: first-seen key order across all objects.
fn union_keys<'a>(objects: impl Iterator<Item = &'a Map<String, Value>>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for obj in objects {
        for key in obj.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    }
    keys
}

fn unsupported(what: &str) -> StrategyError {
    StrategyError::backend(format!(
        "unsupported JSON layout: {what}; expected an array of objects, an array of arrays, \
         or a split/columns object"
    ))
}

/// Flatten a JSON document into a header row and string rows.
pub fn json_to_table(value: &Value) -> Result<Table, StrategyError> {
    match value {
        Value::Array(items) if items.iter().all(Value::is_object) => {
            let objects: Vec<&Map<String, Value>> =
                items.iter().filter_map(Value::as_object).collect();
            let headers = union_keys(objects.iter().copied());
            let rows = objects
                .iter()
                .map(|obj| {
                    headers
                        .iter()
                        .map(|h| obj.get(h).map(cell_text).unwrap_or_default())
                        .collect()
                })
                .collect();
            Ok(Table { headers, rows })
        }
        Value::Array(items) if items.iter().all(Value::is_array) => {
            let width = items
                .iter()
                .filter_map(Value::as_array)
                .map(Vec::len)
                .max()
                .unwrap_or(0);
            let headers = (0..width).map(|i| i.to_string()).collect();
            let rows = items
                .iter()
                .filter_map(Value::as_array)
                .map(|row| {
                    let mut cells: Vec<String> = row.iter().map(cell_text).collect();
                    cells.resize(width, String::new());
                    cells
                })
                .collect();
            Ok(Table { headers, rows })
        }
        Value::Array(_) => Err(unsupported("array mixing objects, arrays and scalars")),
        Value::Object(obj) if obj.get("columns").is_some_and(Value::is_array)
            && obj.get("data").is_some_and(Value::is_array) =>
        {
            let headers: Vec<String> = obj["columns"]
                .as_array()
                .map(|cols| cols.iter().map(cell_text).collect())
                .unwrap_or_default();
            let rows = obj["data"]
                .as_array()
                .map(|data| {
                    data.iter()
                        .map(|row| {
                            let mut cells: Vec<String> = match row {
                                Value::Array(cells) => cells.iter().map(cell_text).collect(),
                                scalar => vec![cell_text(scalar)],
                            };
                            cells.resize(headers.len(), String::new());
                            cells
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(Table { headers, rows })
        }
        Value::Object(obj) if !obj.is_empty() && obj.values().all(Value::is_object) => {
            // {column: {row: value}}
            let columns: Vec<(&String, &Map<String, Value>)> = obj
                .iter()
                .filter_map(|(k, v)| v.as_object().map(|m| (k, m)))
                .collect();
            let labels = union_keys(columns.iter().map(|(_, m)| *m));
            let headers = columns.iter().map(|(k, _)| (*k).clone()).collect();
            let rows = labels
                .iter()
                .map(|label| {
                    columns
                        .iter()
                        .map(|(_, m)| m.get(label).map(cell_text).unwrap_or_default())
                        .collect()
                })
                .collect();
            Ok(Table { headers, rows })
        }
        Value::Object(_) => Err(unsupported("object")),
        _ => Err(unsupported("scalar")),
    }
}

/// JSON → CSV with `serde_json` + `csv`.
pub struct JsonToCsvStrategy {
    options: TabularOptions,
}

impl JsonToCsvStrategy {
    pub fn new(options: TabularOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Strategy for JsonToCsvStrategy {
    fn name(&self) -> &str {
        "csv"
    }

    async fn attempt(&self, source: &Path, staging: &Path) -> Result<(), StrategyError> {
        let source = source.to_path_buf();
        let staging = staging.to_path_buf();
        let options = self.options.clone();

        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&source)?;
            let value: Value = serde_json::from_reader(std::io::BufReader::new(file))
                .map_err(|e| StrategyError::backend(format!("invalid JSON: {e}")))?;
            let table = json_to_table(&value)?;

            let mut writer = csv::WriterBuilder::new()
                .delimiter(options.delimiter)
                .from_path(&staging)
                .map_err(StrategyError::backend)?;
            // A zero-column record still encodes as `""`; leave the file empty.
            if table.headers.is_empty() {
                warn!("JSON table has no columns; nothing to write");
                writer.flush()?;
                return Ok(());
            }
            if options.include_headers {
                writer
                    .write_record(&table.headers)
                    .map_err(StrategyError::backend)?;
            }
            for row in &table.rows {
                writer.write_record(row).map_err(StrategyError::backend)?;
            }
            writer.flush()?;
            info!(
                "Wrote {} rows × {} columns",
                table.rows.len(),
                table.headers.len()
            );
            Ok::<(), StrategyError>(())
        })
        .await
        .map_err(|e| StrategyError::backend(format!("CSV task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn headers_are_deduplicated_and_named() {
        let raw: Vec<String> = ["a", "", "a", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            normalise_headers(&raw),
            ["a", "Unnamed: 1", "a.1", "b", "a.2"]
        );
    }

    #[test]
    fn column_kinds() {
        let kind = |cells: &[&str], dates| infer_kind(cells.iter().copied(), dates);
        assert_eq!(kind(&["1", "-2", ""], false), ColumnKind::Integer);
        assert_eq!(kind(&["1", "2.5"], false), ColumnKind::Float);
        assert_eq!(kind(&["1e3", "2"], false), ColumnKind::Float);
        assert_eq!(kind(&["TRUE", "false"], false), ColumnKind::Boolean);
        assert_eq!(kind(&["2024-01-31", "2024/02/01"], true), ColumnKind::Date);
        assert_eq!(kind(&["2024-01-31"], false), ColumnKind::Text);
        assert_eq!(kind(&["NaN", "inf"], false), ColumnKind::Text);
        assert_eq!(kind(&["", " "], false), ColumnKind::Text);
    }

    #[test]
    fn dates_follow_requested_format() {
        let t = table(&["when"], &[&["2024-01-31"], &["1970-01-02 00:00:00"]]);
        let iso = typed_rows(&t, Some(DateFormat::Iso));
        assert_eq!(iso[0][0], json!("2024-01-31T00:00:00.000"));
        let epoch = typed_rows(&t, Some(DateFormat::Epoch));
        assert_eq!(epoch[1][0], json!(86_400_000));
        let untouched = typed_rows(&t, None);
        assert_eq!(untouched[0][0], json!("2024-01-31"));
    }

    #[test]
    fn empty_cells_are_null() {
        let t = table(&["n", "s"], &[&["1", ""], &["", "x"]]);
        let rows = typed_rows(&t, None);
        assert_eq!(rows[0][1], Value::Null);
        assert_eq!(rows[1][0], Value::Null);
        assert_eq!(rows[0][0], json!(1));
    }

    #[test]
    fn every_orientation() {
        let headers = vec!["a".to_string(), "b".to_string()];
        let rows = || vec![vec![json!(1), json!("x")], vec![json!(2), json!("y")]];

        assert_eq!(
            shape(&headers, rows(), Orient::Records),
            json!([{"a": 1, "b": "x"}, {"a": 2, "b": "y"}])
        );
        assert_eq!(
            shape(&headers, rows(), Orient::Columns),
            json!({"a": {"0": 1, "1": 2}, "b": {"0": "x", "1": "y"}})
        );
        assert_eq!(
            shape(&headers, rows(), Orient::Index),
            json!({"0": {"a": 1, "b": "x"}, "1": {"a": 2, "b": "y"}})
        );
        assert_eq!(
            shape(&headers, rows(), Orient::Split),
            json!({"columns": ["a", "b"], "index": [0, 1], "data": [[1, "x"], [2, "y"]]})
        );
        assert_eq!(
            shape(&headers, rows(), Orient::Values),
            json!([[1, "x"], [2, "y"]])
        );
    }

    #[test]
    fn records_keep_header_order() {
        let headers: Vec<String> = ["zeta", "alpha", "mid"].iter().map(|s| s.to_string()).collect();
        let value = shape(&headers, vec![vec![json!(1), json!(2), json!(3)]], Orient::Records);
        let keys: Vec<&String> = value[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn indentation() {
        let v = json!({"a": [1]});
        assert_eq!(to_json_bytes(&v, None).unwrap(), b"{\"a\":[1]}\n");
        assert_eq!(to_json_bytes(&v, Some(0)).unwrap(), b"{\"a\":[1]}\n");
        let pretty = String::from_utf8(to_json_bytes(&v, Some(4)).unwrap()).unwrap();
        assert!(pretty.contains("\n    \"a\": ["));
    }

    #[test]
    fn reads_ragged_csv_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("t.csv");
        std::fs::write(&p, "\u{feff}id;name\n1;ann\n2\n").unwrap();
        let t = read_table(&p, b';').unwrap();
        assert_eq!(t.headers, ["id", "name"]);
        assert_eq!(t.rows, vec![vec!["1", "ann"], vec!["2", ""]]);

        std::fs::write(&p, "a,b\n1,2,3\n").unwrap();
        assert!(read_table(&p, b',').is_err());
    }

    #[test]
    fn json_layouts_to_table() {
        let records = json!([{"a": 1, "b": null}, {"b": {"x": [1, 2]}, "c": true}]);
        let t = json_to_table(&records).unwrap();
        assert_eq!(t.headers, ["a", "b", "c"]);
        assert_eq!(t.rows[0], ["1", "", ""]);
        assert_eq!(t.rows[1], ["", "{\"x\":[1,2]}", "true"]);

        let arrays = json!([[1, "x"], [2]]);
        let t = json_to_table(&arrays).unwrap();
        assert_eq!(t.headers, ["0", "1"]);
        assert_eq!(t.rows[1], ["2", ""]);

        let split = json!({"columns": ["a"], "index": [0], "data": [[5]]});
        assert_eq!(json_to_table(&split).unwrap().rows, vec![vec!["5"]]);

        let columns = json!({"a": {"0": 1, "1": 2}, "b": {"1": "y"}});
        let t = json_to_table(&columns).unwrap();
        assert_eq!(t.headers, ["a", "b"]);
        assert_eq!(t.rows, vec![vec!["1", ""], vec!["2", "y"]]);

        assert!(json_to_table(&json!(42)).is_err());
        assert!(json_to_table(&json!([1, {"a": 1}])).is_err());
    }

    #[tokio::test]
    async fn json_to_csv_without_headers() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.json");
        std::fs::write(&src, r#"[{"a": 1, "b": "x,y"}]"#).unwrap();
        let out = dir.path().join("out.csv");
        let options = TabularOptions {
            include_headers: false,
            ..TabularOptions::default()
        };
        JsonToCsvStrategy::new(options)
            .attempt(&src, &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "1,\"x,y\"\n");
    }
}
