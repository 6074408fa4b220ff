//! # sf-bulk
//!
//! Salesforce Bulk API 2.0 job lifecycle.
//!
//! An ingest job moves through
//! `Open → UploadComplete → InProgress → {JobComplete | Failed | Aborted}`.
//! [`BulkJobController`] requests each transition, polls until a terminal
//! state and parses the result files. It is built on the request pipeline
//! from `busbar-sf-client`, so every call gets credential refresh, retry and
//! cancellation for free.
//!
//! ## Features
//!
//! - Ingest jobs: insert, update, upsert, delete, hard delete
//! - Upload framing for delimited text (any supported delimiter and line
//!   ending) and newline-delimited JSON
//! - Defensive result parsing: short rows and surplus cells never fail
//! - Query jobs with locator-based result paging
//!
//! ## Example
//!
//! ```rust,ignore
//! use busbar_sf_bulk::{BulkJobController, BulkOperation, CreateIngestJobRequest};
//!
//! let bulk = BulkJobController::from_executor(executor);
//! let job = bulk
//!     .create_job(&ctx, &CreateIngestJobRequest::new("Account", BulkOperation::Insert))
//!     .await?;
//! bulk.upload_records(&ctx, &job.id, &accounts, None).await?;
//! bulk.close(&ctx, &job.id).await?;
//!
//! let job = bulk.await_completion(&ctx, &job.id, Duration::from_secs(5)).await?;
//! for failure in bulk.fetch_failures(&ctx, &job.id).await? {
//!     eprintln!("{:?}: {}", failure.id, failure.error);
//! }
//! ```

mod controller;
mod error;
mod framing;
mod query;
mod results;
mod types;

#[cfg(test)]
mod testing;

pub use controller::{BulkJobController, DEFAULT_POLL_INTERVAL};
pub use error::{Error, ErrorKind, Result};
pub use framing::Framing;
pub use query::{QueryJobResult, QueryResultsPage};
pub use results::{
    parse_failures, parse_records, parse_success, FailureRecord, Record, SuccessRecord, SF_CREATED,
    SF_ERROR, SF_ID,
};
pub use types::{
    BulkOperation, ColumnDelimiter, ContentType, CreateIngestJobRequest, CreateQueryJobRequest,
    IngestJob, IngestJobList, JobListFilter, JobState, LineEnding, QueryJob,
};
