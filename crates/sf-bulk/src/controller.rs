//! Bulk API 2.0 ingest job lifecycle.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument};

use busbar_sf_client::{ApiRequest, Context, HttpApi, RequestBody, RequestExecutor, RequestMethod};

use crate::error::{Error, ErrorKind, Result};
use crate::framing::Framing;
use crate::results::{self, FailureRecord, Record, SuccessRecord};
use crate::types::*;

/// Default polling interval for job status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Drives Bulk API 2.0 jobs through
/// create → upload → close → poll → fetch results.
///
/// Every call goes through an [`HttpApi`], normally the shared
/// [`RequestExecutor`], so credentials, retries and cancellation are handled
/// there. The controller holds no per-job state: job ids are plain strings
/// and the platform owns the state machine. Operations that are only valid
/// in some states check the job's current state first and fail with
/// [`ErrorKind::InvalidState`] instead of sending a doomed request.
///
/// Do not run [`await_completion`](Self::await_completion) for the same job
/// from several tasks without coordinating them yourself.
///
/// # Example
///
/// ```rust,ignore
/// use busbar_sf_bulk::{BulkJobController, BulkOperation, CreateIngestJobRequest};
///
/// let bulk = BulkJobController::from_executor(executor);
/// let job = bulk
///     .create_job(&ctx, &CreateIngestJobRequest::new("Account", BulkOperation::Insert))
///     .await?;
/// bulk.upload(&ctx, &job.id, "Name\nAcme\n").await?;
/// bulk.close(&ctx, &job.id).await?;
/// let done = bulk.await_completion(&ctx, &job.id, Duration::from_secs(2)).await?;
/// let created = bulk.fetch_success(&ctx, &done.id).await?;
/// ```
#[derive(Clone)]
pub struct BulkJobController {
    api: Arc<dyn HttpApi>,
    api_version: String,
}

impl std::fmt::Debug for BulkJobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkJobController")
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl BulkJobController {
    pub fn new(api: Arc<dyn HttpApi>, api_version: impl Into<String>) -> Self {
        let api_version = api_version.into();
        Self {
            api,
            api_version: api_version.trim_start_matches('v').to_string(),
        }
    }

    /// Use the executor's API version.
    pub fn from_executor(executor: Arc<RequestExecutor>) -> Self {
        let api_version = executor.api_version().to_string();
        Self::new(executor, api_version)
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub(crate) fn api(&self) -> &dyn HttpApi {
        self.api.as_ref()
    }

    pub(crate) fn jobs_path(&self, kind: &str) -> String {
        format!("/services/data/v{}/jobs/{}", self.api_version, kind)
    }

    pub(crate) fn job_path(&self, kind: &str, job_id: &str) -> String {
        format!("{}/{}", self.jobs_path(kind), urlencoding::encode(job_id))
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> Result<T> {
        let body = self.api.get(ctx, path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub(crate) async fn send_json<B, T>(
        &self,
        ctx: &Context,
        method: RequestMethod,
        path: &str,
        body: &B,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, path).body(RequestBody::json(body)?);
        let response = self.api.call(ctx, request).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetch a delimited-text resource.
    pub(crate) async fn get_csv(&self, ctx: &Context, path: &str) -> Result<busbar_sf_client::HttpResponse> {
        let request = ApiRequest::new(RequestMethod::Get, path).header("Accept", "text/csv");
        Ok(self.api.call(ctx, request).await?)
    }

    // =========================================================================
    // Ingest Job Operations
    // =========================================================================

    /// Create a new ingest job. The platform starts it in `Open`.
    #[instrument(skip(self, ctx, request), fields(object = %request.object, operation = request.operation.api_name()))]
    pub async fn create_job(&self, ctx: &Context, request: &CreateIngestJobRequest) -> Result<IngestJob> {
        request.validate()?;
        let job: IngestJob = self
            .send_json(ctx, RequestMethod::Post, &self.jobs_path("ingest"), request)
            .await?;
        info!(job_id = %job.id, state = %job.state, "Created ingest job");
        Ok(job)
    }

    /// Upload one batch of already framed data. Allowed while the job is `Open`.
    #[instrument(skip(self, ctx, data))]
    pub async fn upload(&self, ctx: &Context, job_id: &str, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        if data.is_empty() {
            return Err(Error::new(ErrorKind::InvalidRequest(
                "upload data is empty".to_string(),
            )));
        }
        let job = self.require_open(ctx, job_id).await?;
        self.put_batch(ctx, &job, data).await
    }

    /// Frame `records` the way the job expects and upload them as one batch.
    ///
    /// See [`Framing::encode`] for how records and `columns` are laid out.
    /// An empty slice uploads nothing.
    #[instrument(skip(self, ctx, records, columns), fields(records = records.len()))]
    pub async fn upload_records<R: Serialize + Sync>(
        &self,
        ctx: &Context,
        job_id: &str,
        records: &[R],
        columns: Option<&[&str]>,
    ) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let job = self.require_open(ctx, job_id).await?;
        let data = Framing::for_job(&job).encode(records, columns)?;
        self.put_batch(ctx, &job, data).await
    }

    async fn require_open(&self, ctx: &Context, job_id: &str) -> Result<IngestJob> {
        let job = self.poll(ctx, job_id).await?;
        if !job.state.accepts_upload() {
            return Err(Error::invalid_state(job_id, job.state, "upload"));
        }
        Ok(job)
    }

    async fn put_batch(&self, ctx: &Context, job: &IngestJob, data: Bytes) -> Result<()> {
        let path = format!("{}/batches", self.job_path("ingest", &job.id));
        let size = data.len();
        let body = RequestBody::bytes(data, Framing::for_job(job).mime_type());
        self.api.put(ctx, &path, body).await?;
        debug!(job_id = %job.id, bytes = size, "Uploaded batch");
        Ok(())
    }

    /// Mark the upload complete so the platform starts processing.
    ///
    /// Closing an `UploadComplete` job returns it unchanged. Any later state
    /// is rejected with [`ErrorKind::InvalidState`].
    #[instrument(skip(self, ctx))]
    pub async fn close(&self, ctx: &Context, job_id: &str) -> Result<IngestJob> {
        let job = self.poll(ctx, job_id).await?;
        match job.state {
            JobState::Open => {
                let job: IngestJob = self
                    .send_json(
                        ctx,
                        RequestMethod::Patch,
                        &self.job_path("ingest", job_id),
                        &UpdateJobStateRequest::upload_complete(),
                    )
                    .await?;
                info!(job_id, state = %job.state, "Closed ingest job");
                Ok(job)
            }
            JobState::UploadComplete => Ok(job),
            state => Err(Error::invalid_state(job_id, state, "close")),
        }
    }

    /// Get ingest job status. Does not wait.
    #[instrument(skip(self, ctx))]
    pub async fn poll(&self, ctx: &Context, job_id: &str) -> Result<IngestJob> {
        self.get_json(ctx, &self.job_path("ingest", job_id)).await
    }

    /// Poll every `interval` until the job reaches a terminal state.
    ///
    /// `Failed` and `Aborted` jobs are returned, not turned into errors.
    /// Cancelling `ctx` interrupts the wait between polls. A zero interval
    /// falls back to [`DEFAULT_POLL_INTERVAL`].
    #[instrument(skip(self, ctx))]
    pub async fn await_completion(
        &self,
        ctx: &Context,
        job_id: &str,
        interval: Duration,
    ) -> Result<IngestJob> {
        let interval = effective_interval(interval);
        loop {
            let job = self.poll(ctx, job_id).await?;
            debug!(
                job_id,
                state = %job.state,
                processed = job.number_records_processed,
                "Polled ingest job"
            );
            if job.is_terminal() {
                return Ok(job);
            }
            ctx.sleep(interval).await?;
        }
    }

    /// Successfully processed rows.
    #[instrument(skip(self, ctx))]
    pub async fn fetch_success(&self, ctx: &Context, job_id: &str) -> Result<Vec<SuccessRecord>> {
        let (body, delimiter) = self.fetch_result_file(ctx, job_id, "successfulResults").await?;
        results::parse_success(&body, delimiter)
    }

    /// Rows the platform rejected, with its error text.
    #[instrument(skip(self, ctx))]
    pub async fn fetch_failures(&self, ctx: &Context, job_id: &str) -> Result<Vec<FailureRecord>> {
        let (body, delimiter) = self.fetch_result_file(ctx, job_id, "failedResults").await?;
        results::parse_failures(&body, delimiter)
    }

    /// Rows never processed, e.g. because the job was aborted.
    #[instrument(skip(self, ctx))]
    pub async fn fetch_unprocessed(&self, ctx: &Context, job_id: &str) -> Result<Vec<Record>> {
        let (body, delimiter) = self
            .fetch_result_file(ctx, job_id, "unprocessedrecords")
            .await?;
        results::parse_records(&body, delimiter)
    }

    /// Result files use the job's column delimiter, so look the job up first.
    async fn fetch_result_file(
        &self,
        ctx: &Context,
        job_id: &str,
        resource: &str,
    ) -> Result<(Bytes, ColumnDelimiter)> {
        let job = self.poll(ctx, job_id).await?;
        let path = format!("{}/{}", self.job_path("ingest", job_id), resource);
        let response = self.get_csv(ctx, &path).await?;
        Ok((response.body, job.column_delimiter))
    }

    /// Abort a job that has not finished.
    #[instrument(skip(self, ctx))]
    pub async fn abort(&self, ctx: &Context, job_id: &str) -> Result<IngestJob> {
        let job = self.poll(ctx, job_id).await?;
        if job.is_terminal() {
            return Err(Error::invalid_state(job_id, job.state, "abort"));
        }
        let job: IngestJob = self
            .send_json(
                ctx,
                RequestMethod::Patch,
                &self.job_path("ingest", job_id),
                &UpdateJobStateRequest::abort(),
            )
            .await?;
        info!(job_id, "Aborted ingest job");
        Ok(job)
    }

    /// Delete a job once its results have been consumed.
    #[instrument(skip(self, ctx))]
    pub async fn delete(&self, ctx: &Context, job_id: &str) -> Result<()> {
        self.api
            .delete(ctx, &self.job_path("ingest", job_id))
            .await?;
        Ok(())
    }

    /// All ingest jobs in the org, following `nextRecordsUrl`.
    pub async fn list_jobs(&self, ctx: &Context) -> Result<Vec<IngestJob>> {
        self.list_jobs_matching(ctx, &JobListFilter::default()).await
    }

    /// Ingest jobs matching `filter`, following `nextRecordsUrl`.
    #[instrument(skip(self, ctx))]
    pub async fn list_jobs_matching(
        &self,
        ctx: &Context,
        filter: &JobListFilter,
    ) -> Result<Vec<IngestJob>> {
        let mut path = format!("{}{}", self.jobs_path("ingest"), filter.query_string());
        let mut jobs = Vec::new();
        loop {
            let page: IngestJobList = self.get_json(ctx, &path).await?;
            jobs.extend(page.records);
            match page.next_records_url {
                Some(next) if !page.done && !next.is_empty() => path = next,
                _ => return Ok(jobs),
            }
        }
    }
}

pub(crate) fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_POLL_INTERVAL
    } else {
        interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    fn controller(platform: &Arc<FakePlatform>) -> BulkJobController {
        BulkJobController::new(platform.clone(), "62.0")
    }

    fn insert_accounts() -> CreateIngestJobRequest {
        CreateIngestJobRequest::new("Account", BulkOperation::Insert)
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_insert_end_to_end() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        assert_eq!(job.state, JobState::Open);

        bulk.upload(&ctx, &job.id, "Name\nAcme\n").await.unwrap();

        let closed = bulk.close(&ctx, &job.id).await.unwrap();
        assert_eq!(closed.state, JobState::UploadComplete);

        let done = bulk
            .await_completion(&ctx, &job.id, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(done.state, JobState::JobComplete);
        assert!(done.is_success());
        assert_eq!(done.number_records_processed, 1);

        let successes = bulk.fetch_success(&ctx, &job.id).await.unwrap();
        assert_eq!(successes.len(), 1);
        assert!(successes[0].id.as_deref().is_some_and(|id| !id.is_empty()));
        assert!(successes[0].created);
        assert_eq!(successes[0].data.get("Name"), Some("Acme"));

        assert!(bulk.fetch_failures(&ctx, &job.id).await.unwrap().is_empty());

        bulk.delete(&ctx, &job.id).await.unwrap();
        let err = bulk.poll(&ctx, &job.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_job_rejects_close_and_upload() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        bulk.upload(&ctx, &job.id, "Name\nAcme\n").await.unwrap();
        bulk.close(&ctx, &job.id).await.unwrap();
        let done = bulk
            .await_completion(&ctx, &job.id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(done.state, JobState::JobComplete);

        let err = bulk.close(&ctx, &job.id).await.unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::InvalidState {
                state: JobState::JobComplete,
                operation: "close",
                ..
            }
        ));

        let err = bulk.upload(&ctx, &job.id, "Name\nLate\n").await.unwrap_err();
        assert!(err.is_invalid_state());

        let err = bulk.abort(&ctx, &job.id).await.unwrap_err();
        assert!(err.is_invalid_state());

        // Only the original upload and close reached the platform
        assert_eq!(platform.count(RequestMethod::Put, &job.id), 1);
        assert_eq!(platform.count(RequestMethod::Patch, &job.id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_before_processing() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        bulk.upload(&ctx, &job.id, "Name\nAcme\n").await.unwrap();
        let first = bulk.close(&ctx, &job.id).await.unwrap();
        let second = bulk.close(&ctx, &job.id).await.unwrap();
        assert_eq!(first.state, JobState::UploadComplete);
        assert_eq!(second.state, JobState::UploadComplete);

        let err = bulk.upload(&ctx, &job.id, "Name\nLate\n").await.unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::InvalidState {
                state: JobState::UploadComplete,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_reported_not_raised() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        let rows = vec![
            serde_json::json!({"Name": "Acme", "Industry": "Energy"}),
            serde_json::json!({"Industry": "Retail"}),
        ];
        bulk.upload_records(&ctx, &job.id, &rows, Some(&["Name", "Industry"]))
            .await
            .unwrap();
        bulk.close(&ctx, &job.id).await.unwrap();
        let done = bulk
            .await_completion(&ctx, &job.id, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(done.state, JobState::JobComplete);
        assert_eq!(done.number_records_failed, 1);
        assert!(!done.is_success());
        assert!((done.success_rate() - 0.5).abs() < f64::EPSILON);

        let failures = bulk.fetch_failures(&ctx, &job.id).await.unwrap();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].error.starts_with("REQUIRED_FIELD_MISSING"));
        assert!(failures[0].data.field("Name").is_none());
        assert_eq!(failures[0].data.get("Industry"), Some("Retail"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_open_job_leaves_rows_unprocessed() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        bulk.upload(&ctx, &job.id, "Name\nAcme\nGlobex\n").await.unwrap();
        let aborted = bulk.abort(&ctx, &job.id).await.unwrap();
        assert_eq!(aborted.state, JobState::Aborted);

        let done = bulk
            .await_completion(&ctx, &job.id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(done.state, JobState::Aborted);

        let unprocessed = bulk.fetch_unprocessed(&ctx, &job.id).await.unwrap();
        let names: Vec<_> = unprocessed.iter().filter_map(|r| r.get("Name")).collect();
        assert_eq!(names, vec!["Acme", "Globex"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_completion_honors_cancellation() {
        let platform = Arc::new(FakePlatform::new().stalled());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        bulk.upload(&ctx, &job.id, "Name\nAcme\n").await.unwrap();
        bulk.close(&ctx, &job.id).await.unwrap();

        let waiter = ctx.child();
        let canceller = waiter.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = bulk
            .await_completion(&waiter, &job.id, Duration::from_secs(3600))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_completion_honors_deadline() {
        let platform = Arc::new(FakePlatform::new().stalled());
        let bulk = controller(&platform);
        let ctx = Context::background();

        let job = bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        let ctx = Context::with_timeout(Duration::from_secs(10));
        let err = bulk
            .await_completion(&ctx, &job.id, Duration::from_secs(4))
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert!(matches!(
            err.client_error().map(|e| &e.kind),
            Some(busbar_sf_client::ErrorKind::DeadlineExceeded)
        ));
    }

    #[tokio::test]
    async fn test_create_job_validates_locally() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = controller(&platform);
        let err = bulk
            .create_job(
                &Context::background(),
                &CreateIngestJobRequest::new("Account", BulkOperation::Upsert),
            )
            .await
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidRequest(_)));
        assert_eq!(platform.request_count(), 0);
    }

    #[tokio::test]
    async fn test_list_jobs_follows_pages() {
        let platform = Arc::new(FakePlatform::new().with_page_size(2));
        let bulk = controller(&platform);
        let ctx = Context::background();
        for _ in 0..5 {
            bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        }
        let jobs = bulk.list_jobs(&ctx).await.unwrap();
        assert_eq!(jobs.len(), 5);
    }

    #[tokio::test]
    async fn test_list_jobs_by_concurrency_mode() {
        let platform = Arc::new(FakePlatform::new().with_page_size(2));
        let bulk = controller(&platform);
        let ctx = Context::background();
        for _ in 0..3 {
            bulk.create_job(&ctx, &insert_accounts()).await.unwrap();
        }

        let serial = bulk
            .list_jobs_matching(&ctx, &JobListFilter::default().with_concurrency_mode("Serial"))
            .await
            .unwrap();
        assert!(serial.is_empty());
        assert_eq!(platform.count(RequestMethod::Get, "concurrencyMode=Serial"), 1);

        let parallel = bulk
            .list_jobs_matching(&ctx, &JobListFilter::default().with_concurrency_mode("Parallel"))
            .await
            .unwrap();
        assert_eq!(parallel.len(), 3);
        assert!(parallel
            .iter()
            .all(|job| job.concurrency_mode.as_deref() == Some("Parallel")));
        // The filter survives pagination
        assert_eq!(platform.count(RequestMethod::Get, "concurrencyMode=Parallel"), 2);
    }

    #[test]
    fn test_paths() {
        let platform = Arc::new(FakePlatform::new());
        let bulk = BulkJobController::new(platform, "v62.0");
        assert_eq!(bulk.api_version(), "62.0");
        assert_eq!(
            bulk.job_path("ingest", "750xx0000000001"),
            "/services/data/v62.0/jobs/ingest/750xx0000000001"
        );
    }
}
