//! Upload payload framing: delimited text or newline-delimited JSON.

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, ErrorKind, Result};
use crate::types::{ColumnDelimiter, ContentType, IngestJob, LineEnding};

/// How records are laid out in an uploaded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Framing {
    pub content_type: ContentType,
    pub column_delimiter: ColumnDelimiter,
    pub line_ending: LineEnding,
}

impl Framing {
    pub fn csv(column_delimiter: ColumnDelimiter, line_ending: LineEnding) -> Self {
        Self {
            content_type: ContentType::Csv,
            column_delimiter,
            line_ending,
        }
    }

    pub fn json(line_ending: LineEnding) -> Self {
        Self {
            content_type: ContentType::Json,
            column_delimiter: ColumnDelimiter::default(),
            line_ending,
        }
    }

    /// The framing a job was created with.
    pub fn for_job(job: &IngestJob) -> Self {
        Self {
            content_type: job.content_type,
            column_delimiter: job.column_delimiter,
            line_ending: job.line_ending,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.content_type.mime_type()
    }

    /// Frame `records` for upload.
    ///
    /// Each record must serialize to a JSON object (a struct or a map).
    /// `columns` fixes the column order; without it the columns are every key
    /// seen, in first-seen order. Keys a record lacks become empty cells.
    pub fn encode<R: Serialize>(&self, records: &[R], columns: Option<&[&str]>) -> Result<Bytes> {
        let rows = records
            .iter()
            .map(to_object)
            .collect::<Result<Vec<_>>>()?;

        let columns: Vec<String> = match columns {
            Some(columns) => columns.iter().map(|c| c.to_string()).collect(),
            None => discover_columns(&rows),
        };
        if columns.is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "no columns to upload".to_string(),
            )));
        }

        match self.content_type {
            ContentType::Csv => self.encode_csv(&rows, &columns),
            ContentType::Json => self.encode_ndjson(&rows, &columns),
        }
    }

    fn encode_csv(&self, rows: &[Map<String, Value>], columns: &[String]) -> Result<Bytes> {
        let terminator = match self.line_ending {
            LineEnding::Lf => csv::Terminator::Any(b'\n'),
            LineEnding::Crlf => csv::Terminator::CRLF,
        };

        let mut buf = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(self.column_delimiter.as_byte())
                .terminator(terminator)
                .from_writer(&mut buf);
            writer.write_record(columns)?;
            for row in rows {
                writer.write_record(columns.iter().map(|column| cell(row.get(column))))?;
            }
            writer
                .flush()
                .map_err(|e| Error::with_source(ErrorKind::Csv(e.to_string()), e))?;
        }
        Ok(Bytes::from(buf))
    }

    fn encode_ndjson(&self, rows: &[Map<String, Value>], columns: &[String]) -> Result<Bytes> {
        let mut buf = Vec::new();
        for row in rows {
            let projected: Map<String, Value> = columns
                .iter()
                .filter_map(|column| row.get(column).map(|v| (column.clone(), v.clone())))
                .collect();
            serde_json::to_writer(&mut buf, &projected)?;
            buf.extend_from_slice(self.line_ending.as_str().as_bytes());
        }
        Ok(Bytes::from(buf))
    }
}

fn to_object<R: Serialize>(record: &R) -> Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::new(ErrorKind::InvalidRequest(format!(
            "records must serialize to objects, got {}",
            value_kind(&other)
        )))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn discover_columns(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
