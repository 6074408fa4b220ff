//! In-memory Bulk API 2.0 endpoint for controller tests.
//!
//! Jobs advance on the (paused) tokio clock: one second after closing a
//! job reports `InProgress`, two seconds after it completes. Rows without a
//! `Name` fail with `REQUIRED_FIELD_MISSING`.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use busbar_sf_client::{
    ApiErrorDetail, ApiRequest, Context, Error as ClientError, ErrorKind as ClientErrorKind,
    HttpApi, HttpResponse, RequestMethod, Result as ClientResult,
};

use crate::results::{parse_records, Record};
use crate::types::*;

const PREFIX: &str = "/services/data/v62.0/jobs/";
const TO_IN_PROGRESS: Duration = Duration::from_secs(1);
const TO_COMPLETE: Duration = Duration::from_secs(2);

struct FakeIngestJob {
    job: IngestJob,
    closed_at: Option<Instant>,
    columns: Vec<String>,
    rows: Vec<Record>,
    successful: Vec<u8>,
    failed: Vec<u8>,
}

struct FakeQueryJob {
    job: QueryJob,
    created_at: Instant,
}

#[derive(Default)]
struct State {
    next_id: u32,
    ingest: BTreeMap<String, FakeIngestJob>,
    query: BTreeMap<String, FakeQueryJob>,
    requests: Vec<(RequestMethod, String)>,
}

pub(crate) struct FakePlatform {
    state: Mutex<State>,
    stalled: bool,
    page_size: usize,
    query_header: String,
    query_rows: Vec<String>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            stalled: false,
            page_size: 1000,
            query_header: "Id".to_string(),
            query_rows: Vec::new(),
        }
    }

    /// Jobs never get past `InProgress`.
    pub(crate) fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Page size of the job listing.
    pub(crate) fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub(crate) fn with_query_rows(mut self, header: &str, rows: &[&str]) -> Self {
        self.query_header = header.to_string();
        self.query_rows = rows.iter().map(|r| r.to_string()).collect();
        self
    }

    pub(crate) fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    /// Requests with `method` whose path mentions `job_id`.
    pub(crate) fn count(&self, method: RequestMethod, job_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|(m, path)| *m == method && path.contains(job_id))
            .count()
    }

    fn handle(&self, request: &ApiRequest) -> ClientResult<HttpResponse> {
        let mut state = self.state.lock().unwrap();
        state.requests.push((request.method, request.path.clone()));

        let (path, query) = request
            .path
            .split_once('?')
            .unwrap_or((request.path.as_str(), ""));
        let rest = path
            .strip_prefix(PREFIX)
            .ok_or_else(|| not_found(path))?;
        let segments: Vec<&str> = rest.split('/').collect();
        let body = request.body.encode()?;

        match (request.method, segments.as_slice()) {
            (RequestMethod::Post, ["ingest"]) => {
                let create: serde_json::Value = serde_json::from_slice(&body)?;
                state.next_id += 1;
                let id = format!("750FK{:010}", state.next_id);
                let job: IngestJob = serde_json::from_value(serde_json::json!({
                    "id": id,
                    "state": "Open",
                    "object": create["object"],
                    "operation": create["operation"],
                    "contentType": create["contentType"],
                    "columnDelimiter": create["columnDelimiter"],
                    "lineEnding": create["lineEnding"],
                    "concurrencyMode": "Parallel",
                    "apiVersion": 62.0
                }))?;
                let response = json_response(&job);
                state.ingest.insert(
                    id,
                    FakeIngestJob {
                        job,
                        closed_at: None,
                        columns: Vec::new(),
                        rows: Vec::new(),
                        successful: Vec::new(),
                        failed: Vec::new(),
                    },
                );
                Ok(response)
            }
            (RequestMethod::Get, ["ingest"]) => {
                let offset: usize = param(query, "offset")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let mode = param(query, "concurrencyMode");
                let jobs: Vec<&IngestJob> = state
                    .ingest
                    .values()
                    .map(|j| &j.job)
                    .filter(|job| mode.is_none() || job.concurrency_mode.as_deref() == mode)
                    .collect();
                let end = (offset + self.page_size).min(jobs.len());
                let done = end >= jobs.len();
                let mut page = serde_json::json!({
                    "done": done,
                    "records": jobs[offset.min(end)..end],
                });
                if !done {
                    let filters = match mode {
                        Some(mode) => format!("&concurrencyMode={mode}"),
                        None => String::new(),
                    };
                    page["nextRecordsUrl"] =
                        format!("{PREFIX}ingest?offset={end}{filters}").into();
                }
                Ok(HttpResponse::new(200, serde_json::to_vec(&page)?))
            }
            (method, ["ingest", id, tail @ ..]) => {
                let next_id = state.next_id;
                let job = state.ingest.get_mut(*id).ok_or_else(|| not_found(path))?;
                job.advance(self.stalled, next_id);
                match (method, tail) {
                    (RequestMethod::Get, []) => Ok(json_response(&job.job)),
                    (RequestMethod::Put, ["batches"]) => {
                        if job.job.state != JobState::Open {
                            return Err(invalid_job_state(job.job.state));
                        }
                        let mut reader = csv::ReaderBuilder::new()
                            .delimiter(job.job.column_delimiter.as_byte())
                            .from_reader(body.as_ref());
                        if job.columns.is_empty() {
                            job.columns = reader
                                .headers()
                                .map_err(|e| ClientError::new(ClientErrorKind::Other(e.to_string())))?
                                .iter()
                                .map(str::to_string)
                                .collect();
                        }
                        let rows = parse_records(&body, job.job.column_delimiter)
                            .map_err(|e| ClientError::new(ClientErrorKind::Other(e.to_string())))?;
                        job.rows.extend(rows);
                        Ok(HttpResponse::new(201, ""))
                    }
                    (RequestMethod::Patch, []) => {
                        let update: serde_json::Value = serde_json::from_slice(&body)?;
                        match (update["state"].as_str(), job.job.state) {
                            (Some("UploadComplete"), JobState::Open) => {
                                job.job.state = JobState::UploadComplete;
                                job.closed_at = Some(Instant::now());
                            }
                            (Some("Aborted"), state) if !state.is_terminal() => {
                                job.job.state = JobState::Aborted;
                            }
                            (_, state) => return Err(invalid_job_state(state)),
                        }
                        Ok(json_response(&job.job))
                    }
                    (RequestMethod::Delete, []) => {
                        state.ingest.remove(*id);
                        Ok(HttpResponse::new(204, ""))
                    }
                    (RequestMethod::Get, ["successfulResults"]) => {
                        Ok(HttpResponse::new(200, job.successful.clone()))
                    }
                    (RequestMethod::Get, ["failedResults"]) => {
                        Ok(HttpResponse::new(200, job.failed.clone()))
                    }
                    (RequestMethod::Get, ["unprocessedrecords"]) => {
                        Ok(HttpResponse::new(200, job.unprocessed()))
                    }
                    _ => Err(not_found(path)),
                }
            }
            (RequestMethod::Post, ["query"]) => {
                let create: serde_json::Value = serde_json::from_slice(&body)?;
                state.next_id += 1;
                let id = format!("750FQ{:010}", state.next_id);
                let job: QueryJob = serde_json::from_value(serde_json::json!({
                    "id": id,
                    "state": "UploadComplete",
                    "operation": create["operation"],
                    "object": "Account",
                    "query": create["query"],
                    "columnDelimiter": create["columnDelimiter"],
                    "lineEnding": create["lineEnding"],
                }))?;
                let response = json_response(&job);
                state.query.insert(
                    id,
                    FakeQueryJob {
                        job,
                        created_at: Instant::now(),
                    },
                );
                Ok(response)
            }
            (method, ["query", id, tail @ ..]) => {
                let job = state.query.get_mut(*id).ok_or_else(|| not_found(path))?;
                job.advance(self.stalled, self.query_rows.len());
                match (method, tail) {
                    (RequestMethod::Get, []) => Ok(json_response(&job.job)),
                    (RequestMethod::Patch, []) => {
                        if job.job.is_terminal() {
                            return Err(invalid_job_state(job.job.state));
                        }
                        job.job.state = JobState::Aborted;
                        Ok(json_response(&job.job))
                    }
                    (RequestMethod::Delete, []) => {
                        state.query.remove(*id);
                        Ok(HttpResponse::new(204, ""))
                    }
                    (RequestMethod::Get, ["results"]) => {
                        if job.job.state != JobState::JobComplete {
                            return Err(invalid_job_state(job.job.state));
                        }
                        let start: usize = param(query, "locator")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        let max: usize = param(query, "maxRecords")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(usize::MAX);
                        let end = start.saturating_add(max).min(self.query_rows.len());
                        let mut csv = format!("{}\n", self.query_header);
                        for row in &self.query_rows[start.min(end)..end] {
                            csv.push_str(row);
                            csv.push('\n');
                        }
                        let locator = if end < self.query_rows.len() {
                            end.to_string()
                        } else {
                            "null".to_string()
                        };
                        Ok(HttpResponse::new(200, csv)
                            .with_header("Sforce-Locator", locator)
                            .with_header("Sforce-NumberOfRecords", (end - start.min(end)).to_string()))
                    }
                    _ => Err(not_found(path)),
                }
            }
            _ => Err(not_found(path)),
        }
    }
}

#[async_trait]
impl HttpApi for FakePlatform {
    async fn call(&self, ctx: &Context, request: ApiRequest) -> ClientResult<HttpResponse> {
        ctx.check()?;
        self.handle(&request)
    }
}

impl FakeIngestJob {
    fn advance(&mut self, stalled: bool, seed: u32) {
        let Some(closed_at) = self.closed_at else {
            return;
        };
        let elapsed = closed_at.elapsed();
        if self.job.state == JobState::UploadComplete && elapsed >= TO_IN_PROGRESS {
            self.job.state = JobState::InProgress;
        }
        if self.job.state == JobState::InProgress && elapsed >= TO_COMPLETE && !stalled {
            self.complete(seed);
        }
    }

    fn complete(&mut self, seed: u32) {
        let mut successful = csv::Writer::from_writer(Vec::new());
        let mut failed = csv::Writer::from_writer(Vec::new());
        let header = |first: &str, second: &str| {
            let mut header = vec![first.to_string(), second.to_string()];
            header.extend(self.columns.iter().cloned());
            header
        };
        successful.write_record(header("sf__Id", "sf__Created")).unwrap();
        failed.write_record(header("sf__Id", "sf__Error")).unwrap();

        let mut failures = 0;
        for (index, row) in self.rows.iter().enumerate() {
            let values = self.columns.iter().map(|c| row.get(c).unwrap_or("").to_string());
            if row.field("Name").is_some() {
                let id = format!("001FK{:05}{:05}", seed, index + 1);
                let mut record = vec![id, "true".to_string()];
                record.extend(values);
                successful.write_record(record).unwrap();
            } else {
                failures += 1;
                let mut record = vec![
                    String::new(),
                    "REQUIRED_FIELD_MISSING:Required fields are missing: [Name]".to_string(),
                ];
                record.extend(values);
                failed.write_record(record).unwrap();
            }
        }

        self.successful = successful.into_inner().unwrap();
        self.failed = failed.into_inner().unwrap();
        self.job.number_records_processed = self.rows.len() as i64;
        self.job.number_records_failed = failures;
        self.job.state = JobState::JobComplete;
    }

    fn unprocessed(&self) -> Vec<u8> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns).unwrap();
        if self.job.state == JobState::Aborted {
            for row in &self.rows {
                writer
                    .write_record(self.columns.iter().map(|c| row.get(c).unwrap_or("")))
                    .unwrap();
            }
        }
        writer.into_inner().unwrap()
    }
}

impl FakeQueryJob {
    fn advance(&mut self, stalled: bool, rows: usize) {
        if self.job.is_terminal() {
            return;
        }
        let elapsed = self.created_at.elapsed();
        if elapsed >= TO_IN_PROGRESS {
            self.job.state = JobState::InProgress;
        }
        if elapsed >= TO_COMPLETE && !stalled {
            self.job.state = JobState::JobComplete;
            self.job.number_records_processed = rows as i64;
        }
    }
}

fn param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn json_response<T: serde::Serialize>(value: &T) -> HttpResponse {
    HttpResponse::new(200, serde_json::to_vec(value).unwrap())
}

fn not_found(path: &str) -> ClientError {
    ClientError::new(ClientErrorKind::NotFound {
        errors: vec![ApiErrorDetail::new(
            "NOT_FOUND",
            format!("The requested resource does not exist: {path}"),
        )],
    })
}

fn invalid_job_state(state: JobState) -> ClientError {
    ClientError::new(ClientErrorKind::Validation {
        status: 400,
        errors: vec![ApiErrorDetail::new(
            "INVALIDJOBSTATE",
            format!("Job is in state {state}"),
        )],
    })
}
