//! Defensive parsing of job result files.
//!
//! Result files are delimited text with a header row. Success files start
//! with `sf__Id` and `sf__Created`, failure files with `sf__Id` and
//! `sf__Error`; the original data columns follow. Short rows, missing
//! trailing cells and surplus cells are all tolerated: a missing cell is
//! simply absent from the record.

use tracing::debug;

use crate::error::Result;
use crate::types::ColumnDelimiter;

/// Synthetic record id column.
pub const SF_ID: &str = "sf__Id";
/// Synthetic "record was created" column of success files.
pub const SF_CREATED: &str = "sf__Created";
/// Synthetic error message column of failure files.
pub const SF_ERROR: &str = "sf__Error";

/// One row, keyed by the header's column names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
    extra: Vec<String>,
}

impl Record {
    /// The cell under `column`, if the row had one. May be empty.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// The cell under `column` when present and non-empty.
    pub fn field(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|value| !value.is_empty())
    }

    /// Column names present in this row, in header order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Cells beyond the last header column.
    pub fn extra(&self) -> &[String] {
        &self.extra
    }

    fn take(&mut self, column: &str) -> Option<String> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }
}

/// A row of a job's successful results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessRecord {
    /// Id of the created or updated record.
    pub id: Option<String>,
    /// Whether the row created a new record (as opposed to updating one).
    pub created: bool,
    /// The original data columns.
    pub data: Record,
}

/// A row of a job's failed results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Id of the target record, when the operation had one.
    pub id: Option<String>,
    /// The platform's error text, verbatim.
    pub error: String,
    /// The original data columns.
    pub data: Record,
}

/// Parse delimited text into records keyed by the header row.
///
/// An empty body yields no records.
pub fn parse_records(body: &[u8], delimiter: ColumnDelimiter) -> Result<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(body);

    let headers: Vec<String> = reader
        .byte_headers()?
        .iter()
        .map(|h| String::from_utf8_lossy(h).into_owned())
        .collect();

    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row?;
        let mut record = Record::default();
        for (index, value) in row.iter().enumerate() {
            let value = String::from_utf8_lossy(value).into_owned();
            match headers.get(index) {
                Some(name) => record.fields.push((name.clone(), value)),
                None => record.extra.push(value),
            }
        }
        if !record.extra.is_empty() {
            debug!(
                extra = record.extra.len(),
                "Result row has more cells than the header"
            );
        }
        records.push(record);
    }
    Ok(records)
}

/// Parse a successful-results file.
pub fn parse_success(body: &[u8], delimiter: ColumnDelimiter) -> Result<Vec<SuccessRecord>> {
    Ok(parse_records(body, delimiter)?
        .into_iter()
        .map(|mut data| {
            let id = data.take(SF_ID).filter(|id| !id.is_empty());
            let created = data
                .take(SF_CREATED)
                .is_some_and(|value| value.eq_ignore_ascii_case("true"));
            SuccessRecord { id, created, data }
        })
        .collect())
}

/// Parse a failed-results file.
pub fn parse_failures(body: &[u8], delimiter: ColumnDelimiter) -> Result<Vec<FailureRecord>> {
    Ok(parse_records(body, delimiter)?
        .into_iter()
        .map(|mut data| {
            let id = data.take(SF_ID).filter(|id| !id.is_empty());
            let error = data.take(SF_ERROR).unwrap_or_default();
            FailureRecord { id, error, data }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_row_with_empty_trailing_cell() {
        let body = b"\"sf__Id\",\"sf__Error\",\"Name\"\n\"001xx0000000001\",\"REQUIRED_FIELD_MISSING: Name\",\"\"\n";
        let failures = parse_failures(body, ColumnDelimiter::Comma).unwrap();
        assert_eq!(failures.len(), 1);
        let failure = &failures[0];
        assert_eq!(failure.id.as_deref(), Some("001xx0000000001"));
        assert_eq!(failure.error, "REQUIRED_FIELD_MISSING: Name");
        assert!(failure.data.field("Name").is_none());
        assert_eq!(failure.data.columns().collect::<Vec<_>>(), vec!["Name"]);
    }

    #[test]
    fn test_short_rows_leave_cells_absent() {
        let body = b"sf__Id,sf__Error,Name,Industry\n,DUPLICATE_VALUE: duplicate\n";
        let failures = parse_failures(body, ColumnDelimiter::Comma).unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].id.is_none());
        assert_eq!(failures[0].error, "DUPLICATE_VALUE: duplicate");
        assert!(failures[0].data.get("Name").is_none());
        assert!(failures[0].data.get("Industry").is_none());
    }

    #[test]
    fn test_extra_cells_are_kept_aside() {
        let body = b"sf__Id,sf__Created,Name\n001xx0000000002,true,Acme,surplus\n";
        let successes = parse_success(body, ColumnDelimiter::Comma).unwrap();
        assert_eq!(successes.len(), 1);
        assert_eq!(successes[0].id.as_deref(), Some("001xx0000000002"));
        assert!(successes[0].created);
        assert_eq!(successes[0].data.get("Name"), Some("Acme"));
        assert_eq!(successes[0].data.extra(), ["surplus".to_string()]);
    }

    #[test]
    fn test_job_delimiter_and_crlf() {
        let body = b"sf__Id|sf__Created|Name\r\n001xx0000000003|false|Globex, Ltd\r\n";
        let successes = parse_success(body, ColumnDelimiter::Pipe).unwrap();
        assert!(!successes[0].created);
        assert_eq!(successes[0].data.get("Name"), Some("Globex, Ltd"));
    }

    #[test]
    fn test_empty_body() {
        assert!(parse_records(b"", ColumnDelimiter::Comma).unwrap().is_empty());
        assert!(parse_records(b"Name\n", ColumnDelimiter::Comma)
            .unwrap()
            .is_empty());
    }
}
