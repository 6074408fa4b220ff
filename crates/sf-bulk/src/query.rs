//! Bulk API 2.0 query jobs.
//!
//! Results come back in pages. Each page carries an `Sforce-Locator`
//! header naming the next page; the literal `null` marks the last one.

use std::time::Duration;

use tracing::{debug, info, instrument};

use busbar_sf_client::{Context, RequestMethod};

use crate::controller::{effective_interval, BulkJobController};
use crate::error::{Error, Result};
use crate::results::{self, Record};
use crate::types::{CreateQueryJobRequest, JobState, QueryJob, UpdateJobStateRequest};

const LOCATOR_HEADER: &str = "Sforce-Locator";
const NUMBER_OF_RECORDS_HEADER: &str = "Sforce-NumberOfRecords";

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryResultsPage {
    pub records: Vec<Record>,
    /// Locator of the next page, `None` on the last page
    pub locator: Option<String>,
    /// Row count the platform reported for this page
    pub number_of_records: Option<u64>,
}

impl QueryResultsPage {
    pub fn is_last(&self) -> bool {
        self.locator.is_none()
    }
}

/// Result of a completed query job.
#[derive(Debug, Clone)]
pub struct QueryJobResult {
    /// The job in its terminal state
    pub job: QueryJob,
    /// Every result row; empty unless the job completed
    pub records: Vec<Record>,
}

impl QueryJobResult {
    pub fn is_success(&self) -> bool {
        self.job.is_success()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

impl BulkJobController {
    /// Create a query job.
    #[instrument(skip(self, ctx, request), fields(operation = request.operation.api_name()))]
    pub async fn create_query_job(
        &self,
        ctx: &Context,
        request: &CreateQueryJobRequest,
    ) -> Result<QueryJob> {
        request.validate()?;
        let job: QueryJob = self
            .send_json(ctx, RequestMethod::Post, &self.jobs_path("query"), request)
            .await?;
        info!(job_id = %job.id, state = %job.state, "Created query job");
        Ok(job)
    }

    /// Get query job status. Does not wait.
    #[instrument(skip(self, ctx))]
    pub async fn poll_query_job(&self, ctx: &Context, job_id: &str) -> Result<QueryJob> {
        self.get_json(ctx, &self.job_path("query", job_id)).await
    }

    /// Poll every `interval` until the query job reaches a terminal state.
    #[instrument(skip(self, ctx))]
    pub async fn await_query_job(
        &self,
        ctx: &Context,
        job_id: &str,
        interval: Duration,
    ) -> Result<QueryJob> {
        let interval = effective_interval(interval);
        loop {
            let job = self.poll_query_job(ctx, job_id).await?;
            debug!(job_id, state = %job.state, "Polled query job");
            if job.is_terminal() {
                return Ok(job);
            }
            ctx.sleep(interval).await?;
        }
    }

    /// Fetch one page of results of a completed query job.
    ///
    /// Pass the previous page's locator to continue; `max_records` caps the
    /// page size.
    #[instrument(skip(self, ctx))]
    pub async fn query_results(
        &self,
        ctx: &Context,
        job_id: &str,
        max_records: Option<u32>,
        locator: Option<&str>,
    ) -> Result<QueryResultsPage> {
        let job = self.require_complete(ctx, job_id).await?;
        self.results_page(ctx, &job, max_records, locator).await
    }

    /// Fetch every page of results of a completed query job.
    #[instrument(skip(self, ctx))]
    pub async fn fetch_all_query_results(
        &self,
        ctx: &Context,
        job_id: &str,
        max_records: Option<u32>,
    ) -> Result<Vec<Record>> {
        let job = self.require_complete(ctx, job_id).await?;
        self.all_pages(ctx, &job, max_records).await
    }

    /// Create a query job, wait for it and collect all rows.
    ///
    /// A job that ends `Failed` or `Aborted` is returned with no rows.
    #[instrument(skip(self, ctx, request))]
    pub async fn execute_query(
        &self,
        ctx: &Context,
        request: &CreateQueryJobRequest,
        interval: Duration,
    ) -> Result<QueryJobResult> {
        let job = self.create_query_job(ctx, request).await?;
        let job = self.await_query_job(ctx, &job.id, interval).await?;
        let records = if job.is_success() {
            self.all_pages(ctx, &job, None).await?
        } else {
            Vec::new()
        };
        Ok(QueryJobResult { job, records })
    }

    /// Abort a query job that has not finished.
    #[instrument(skip(self, ctx))]
    pub async fn abort_query_job(&self, ctx: &Context, job_id: &str) -> Result<QueryJob> {
        let job = self.poll_query_job(ctx, job_id).await?;
        if job.is_terminal() {
            return Err(Error::invalid_state(job_id, job.state, "abort"));
        }
        self.send_json(
            ctx,
            RequestMethod::Patch,
            &self.job_path("query", job_id),
            &UpdateJobStateRequest::abort(),
        )
        .await
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_query_job(&self, ctx: &Context, job_id: &str) -> Result<()> {
        self.api()
            .delete(ctx, &self.job_path("query", job_id))
            .await?;
        Ok(())
    }

    async fn require_complete(&self, ctx: &Context, job_id: &str) -> Result<QueryJob> {
        let job = self.poll_query_job(ctx, job_id).await?;
        if job.state != JobState::JobComplete {
            return Err(Error::invalid_state(job_id, job.state, "fetch results"));
        }
        Ok(job)
    }

    async fn all_pages(
        &self,
        ctx: &Context,
        job: &QueryJob,
        max_records: Option<u32>,
    ) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut locator: Option<String> = None;
        loop {
            let page = self
                .results_page(ctx, job, max_records, locator.as_deref())
                .await?;
            records.extend(page.records);
            match page.locator {
                Some(next) => locator = Some(next),
                None => return Ok(records),
            }
        }
    }

    async fn results_page(
        &self,
        ctx: &Context,
        job: &QueryJob,
        max_records: Option<u32>,
        locator: Option<&str>,
    ) -> Result<QueryResultsPage> {
        let mut params = Vec::new();
        if let Some(max) = max_records {
            params.push(format!("maxRecords={max}"));
        }
        if let Some(locator) = locator {
            params.push(format!("locator={}", urlencoding::encode(locator)));
        }
        let mut path = format!("{}/results", self.job_path("query", &job.id));
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }

        let response = self.get_csv(ctx, &path).await?;
        let locator = response
            .header(LOCATOR_HEADER)
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "null")
            .map(str::to_string);
        let number_of_records = response
            .header(NUMBER_OF_RECORDS_HEADER)
            .and_then(|value| value.trim().parse().ok());
        let records = results::parse_records(&response.body, job.column_delimiter)?;
        debug!(
            job_id = %job.id,
            rows = records.len(),
            last = locator.is_none(),
            "Fetched query results page"
        );

        Ok(QueryResultsPage {
            records,
            locator,
            number_of_records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;
    use std::sync::Arc;

    fn platform() -> Arc<FakePlatform> {
        Arc::new(FakePlatform::new().with_query_rows(
            "Id,Name",
            &[
                "001xx0000000001,Acme",
                "001xx0000000002,Globex",
                "001xx0000000003,Initech",
                "001xx0000000004,Umbrella",
                "001xx0000000005,\"Stark, Industries\"",
            ],
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_all_pages_follows_locator() {
        let platform = platform();
        let bulk = BulkJobController::new(platform.clone(), "62.0");
        let ctx = Context::background();

        let job = bulk
            .create_query_job(&ctx, &CreateQueryJobRequest::new("SELECT Id, Name FROM Account"))
            .await
            .unwrap();
        let job = bulk
            .await_query_job(&ctx, &job.id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(job.state, JobState::JobComplete);

        let first = bulk
            .query_results(&ctx, &job.id, Some(2), None)
            .await
            .unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.number_of_records, Some(2));
        assert!(!first.is_last());

        let records = bulk
            .fetch_all_query_results(&ctx, &job.id, Some(2))
            .await
            .unwrap();
        let names: Vec<_> = records.iter().filter_map(|r| r.get("Name")).collect();
        assert_eq!(
            names,
            vec!["Acme", "Globex", "Initech", "Umbrella", "Stark, Industries"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_rejected_before_completion() {
        let platform = platform();
        let bulk = BulkJobController::new(platform, "62.0");
        let ctx = Context::background();

        let job = bulk
            .create_query_job(&ctx, &CreateQueryJobRequest::new("SELECT Id FROM Account"))
            .await
            .unwrap();
        let err = bulk
            .query_results(&ctx, &job.id, None, None)
            .await
            .unwrap_err();
        assert!(err.is_invalid_state());

        let aborted = bulk.abort_query_job(&ctx, &job.id).await.unwrap();
        assert_eq!(aborted.state, JobState::Aborted);
        assert!(bulk.abort_query_job(&ctx, &job.id).await.unwrap_err().is_invalid_state());

        bulk.delete_query_job(&ctx, &job.id).await.unwrap();
        assert!(bulk
            .poll_query_job(&ctx, &job.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_query_collects_every_row() {
        let platform = platform();
        let bulk = BulkJobController::new(platform, "62.0");
        let ctx = Context::background();

        let result = bulk
            .execute_query(
                &ctx,
                &CreateQueryJobRequest::new("SELECT Id, Name FROM Account").with_query_all(),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(result.is_success());
        assert_eq!(result.record_count(), 5);
        assert_eq!(result.job.operation, crate::types::BulkOperation::QueryAll);
    }
}
