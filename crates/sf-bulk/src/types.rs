//! Types for Bulk API 2.0.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, ErrorKind, Result};

/// Deserialize API version that can be either a float (62.0) or string ("62.0").
pub(crate) fn deserialize_api_version<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ApiVersion {
        Float(f64),
        String(String),
    }

    Option::<ApiVersion>::deserialize(deserializer).map(|opt| {
        opt.map(|v| match v {
            ApiVersion::Float(f) => format!("{:.1}", f),
            ApiVersion::String(s) => s,
        })
    })
}

/// Bulk API 2.0 job states.
///
/// The platform moves a job along
/// `Open → UploadComplete → InProgress → {JobComplete | Failed | Aborted}`;
/// the client only requests transitions, it never sets state locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Job is open and accepting data
    Open,
    /// Upload is complete, job is queued for processing
    UploadComplete,
    /// Job is processing
    InProgress,
    /// Job was aborted
    Aborted,
    /// Job finished processing
    JobComplete,
    /// Job failed
    Failed,
}

impl JobState {
    /// Check if job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Aborted | JobState::JobComplete | JobState::Failed
        )
    }

    /// Check if job finished processing.
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::JobComplete)
    }

    /// Whether batches may still be uploaded.
    pub fn accepts_upload(&self) -> bool {
        matches!(self, JobState::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Open => "Open",
            JobState::UploadComplete => "UploadComplete",
            JobState::InProgress => "InProgress",
            JobState::Aborted => "Aborted",
            JobState::JobComplete => "JobComplete",
            JobState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bulk API 2.0 operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulkOperation {
    /// Insert new records
    Insert,
    /// Update existing records
    Update,
    /// Upsert based on external ID
    Upsert,
    /// Delete records (soft delete)
    Delete,
    /// Hard delete records (permanent)
    HardDelete,
    /// Query records
    Query,
    /// Query all records including deleted
    QueryAll,
}

impl BulkOperation {
    /// Get the API string for this operation.
    pub fn api_name(&self) -> &'static str {
        match self {
            BulkOperation::Insert => "insert",
            BulkOperation::Update => "update",
            BulkOperation::Upsert => "upsert",
            BulkOperation::Delete => "delete",
            BulkOperation::HardDelete => "hardDelete",
            BulkOperation::Query => "query",
            BulkOperation::QueryAll => "queryAll",
        }
    }

    /// Check if this is a query operation.
    pub fn is_query(&self) -> bool {
        matches!(self, BulkOperation::Query | BulkOperation::QueryAll)
    }

    /// Check if this is an ingest operation.
    pub fn is_ingest(&self) -> bool {
        !self.is_query()
    }
}

/// Payload framing of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContentType {
    /// Delimited text with a header row
    #[default]
    #[serde(rename = "CSV")]
    Csv,
    /// Newline-delimited JSON objects
    #[serde(rename = "JSON")]
    Json,
}

impl ContentType {
    /// MIME type sent with uploaded batches.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentType::Csv => "text/csv",
            ContentType::Json => "application/json",
        }
    }
}

/// Line ending style for Bulk API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LineEnding {
    /// Unix-style (LF)
    #[default]
    #[serde(rename = "LF")]
    Lf,
    /// Windows-style (CRLF)
    #[serde(rename = "CRLF")]
    Crlf,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

/// Column delimiter for Bulk API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ColumnDelimiter {
    #[default]
    #[serde(rename = "COMMA")]
    Comma,
    #[serde(rename = "TAB")]
    Tab,
    #[serde(rename = "SEMICOLON")]
    Semicolon,
    #[serde(rename = "PIPE")]
    Pipe,
    #[serde(rename = "BACKQUOTE")]
    Backquote,
    #[serde(rename = "CARET")]
    Caret,
}

impl ColumnDelimiter {
    /// Get the API string for this delimiter.
    pub fn api_name(&self) -> &'static str {
        match self {
            ColumnDelimiter::Comma => "COMMA",
            ColumnDelimiter::Tab => "TAB",
            ColumnDelimiter::Semicolon => "SEMICOLON",
            ColumnDelimiter::Pipe => "PIPE",
            ColumnDelimiter::Backquote => "BACKQUOTE",
            ColumnDelimiter::Caret => "CARET",
        }
    }

    /// The delimiter as a single byte, as the csv reader and writer expect it.
    pub fn as_byte(&self) -> u8 {
        match self {
            ColumnDelimiter::Comma => b',',
            ColumnDelimiter::Tab => b'\t',
            ColumnDelimiter::Semicolon => b';',
            ColumnDelimiter::Pipe => b'|',
            ColumnDelimiter::Backquote => b'`',
            ColumnDelimiter::Caret => b'^',
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Request to create an ingest job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestJobRequest {
    /// SObject API name
    pub object: String,
    pub operation: BulkOperation,
    /// External ID field for upsert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id_field_name: Option<String>,
    pub content_type: ContentType,
    pub column_delimiter: ColumnDelimiter,
    pub line_ending: LineEnding,
}

impl CreateIngestJobRequest {
    /// Create a new ingest job request.
    pub fn new(sobject: impl Into<String>, operation: BulkOperation) -> Self {
        Self {
            object: sobject.into(),
            operation,
            external_id_field_name: None,
            content_type: ContentType::default(),
            column_delimiter: ColumnDelimiter::default(),
            line_ending: LineEnding::default(),
        }
    }

    /// Set the external ID field for upsert operations.
    pub fn with_external_id_field(mut self, field: impl Into<String>) -> Self {
        self.external_id_field_name = Some(field.into());
        self
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// Set the column delimiter.
    pub fn with_column_delimiter(mut self, delimiter: ColumnDelimiter) -> Self {
        self.column_delimiter = delimiter;
        self
    }

    /// Set the line ending.
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Reject requests the platform would refuse.
    pub fn validate(&self) -> Result<()> {
        if self.object.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "object is required".to_string(),
            )));
        }
        if self.operation.is_query() {
            return Err(Error::new(ErrorKind::InvalidRequest(format!(
                "{} is not an ingest operation",
                self.operation.api_name()
            ))));
        }
        if self.operation == BulkOperation::Upsert && self.external_id_field_name.is_none() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "upsert requires externalIdFieldName".to_string(),
            )));
        }
        Ok(())
    }
}

/// Request to create a query job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryJobRequest {
    /// SOQL query
    pub query: String,
    /// `query` or `queryAll`
    pub operation: BulkOperation,
    pub content_type: ContentType,
    pub column_delimiter: ColumnDelimiter,
    pub line_ending: LineEnding,
}

impl CreateQueryJobRequest {
    /// Create a new query job request.
    pub fn new(soql: impl Into<String>) -> Self {
        Self {
            query: soql.into(),
            operation: BulkOperation::Query,
            content_type: ContentType::Csv,
            column_delimiter: ColumnDelimiter::default(),
            line_ending: LineEnding::default(),
        }
    }

    /// Use queryAll instead of query (includes deleted records).
    pub fn with_query_all(mut self) -> Self {
        self.operation = BulkOperation::QueryAll;
        self
    }

    /// Set the column delimiter.
    pub fn with_column_delimiter(mut self, delimiter: ColumnDelimiter) -> Self {
        self.column_delimiter = delimiter;
        self
    }

    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "query is required".to_string(),
            )));
        }
        if !self.operation.is_query() {
            return Err(Error::new(ErrorKind::InvalidRequest(format!(
                "{} is not a query operation",
                self.operation.api_name()
            ))));
        }
        Ok(())
    }
}

/// Body of a state change request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UpdateJobStateRequest {
    pub state: JobState,
}

impl UpdateJobStateRequest {
    pub fn upload_complete() -> Self {
        Self {
            state: JobState::UploadComplete,
        }
    }

    pub fn abort() -> Self {
        Self {
            state: JobState::Aborted,
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// Ingest job response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJob {
    pub id: String,
    pub state: JobState,
    /// SObject API name
    pub object: String,
    pub operation: BulkOperation,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub column_delimiter: ColumnDelimiter,
    #[serde(default)]
    pub line_ending: LineEnding,
    #[serde(default)]
    pub external_id_field_name: Option<String>,
    /// Records processed so far, failed ones included
    #[serde(default)]
    pub number_records_processed: i64,
    #[serde(default)]
    pub number_records_failed: i64,
    #[serde(default)]
    pub retries: Option<i64>,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub system_modstamp: Option<String>,
    /// Total processing time in milliseconds
    #[serde(default)]
    pub total_processing_time: Option<i64>,
    /// API version (can be float like 62.0 or string like "62.0")
    #[serde(default, deserialize_with = "deserialize_api_version")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub concurrency_mode: Option<String>,
    /// Error message if failed
    #[serde(default)]
    pub error_message: Option<String>,
}

impl IngestJob {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Completed with no failed records.
    pub fn is_success(&self) -> bool {
        self.state.is_success() && self.number_records_failed == 0
    }

    pub fn has_failures(&self) -> bool {
        self.number_records_failed > 0
    }

    /// Share of processed records that succeeded, 1.0 when nothing was processed.
    pub fn success_rate(&self) -> f64 {
        if self.number_records_processed <= 0 {
            return 1.0;
        }
        let succeeded = (self.number_records_processed - self.number_records_failed).max(0);
        succeeded as f64 / self.number_records_processed as f64
    }
}

/// One page of the ingest job listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestJobList {
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub records: Vec<IngestJob>,
    /// Path of the next page, absent on the last one
    #[serde(default)]
    pub next_records_url: Option<String>,
}

/// Server-side filters for the ingest job listing. Unset filters are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobListFilter {
    /// `Parallel` or `Serial`.
    pub concurrency_mode: Option<String>,
    pub is_pk_chunking_enabled: Option<bool>,
}

impl JobListFilter {
    pub fn with_concurrency_mode(mut self, mode: impl Into<String>) -> Self {
        self.concurrency_mode = Some(mode.into());
        self
    }

    pub fn with_pk_chunking(mut self, enabled: bool) -> Self {
        self.is_pk_chunking_enabled = Some(enabled);
        self
    }

    /// Query string for the listing, including the leading `?`, or empty.
    pub(crate) fn query_string(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(mode) = &self.concurrency_mode {
            pairs.push(format!("concurrencyMode={}", urlencoding::encode(mode)));
        }
        if let Some(enabled) = self.is_pk_chunking_enabled {
            pairs.push(format!("isPkChunkingEnabled={enabled}"));
        }
        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    }
}

/// Query job response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryJob {
    pub id: String,
    pub state: JobState,
    pub operation: BulkOperation,
    #[serde(default)]
    pub object: Option<String>,
    /// SOQL query
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default)]
    pub column_delimiter: ColumnDelimiter,
    #[serde(default)]
    pub line_ending: LineEnding,
    #[serde(default)]
    pub number_records_processed: i64,
    #[serde(default)]
    pub created_date: Option<String>,
    #[serde(default)]
    pub system_modstamp: Option<String>,
    #[serde(default)]
    pub total_processing_time: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_api_version")]
    pub api_version: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl QueryJob {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_success(&self) -> bool {
        self.state.is_success()
    }
}
