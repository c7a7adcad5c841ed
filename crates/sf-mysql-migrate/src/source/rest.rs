//! REST implementation of [`SourceApi`].
//!
//! Uses the describe endpoints for metadata and v2 query jobs for bulk
//! data. Result pages are streamed: the HTTP body is bridged into a
//! blocking CSV reader, and rows flow to the consumer through a bounded
//! channel.

use futures::TryStreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, info};

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};

use super::{FieldDescriptor, QueryJobState, ResultStream, SObjectInfo, SourceApi};

/// Rows buffered between the HTTP stream and the consumer.
const RESULT_CHANNEL_CAPACITY: usize = 64;

/// Authenticated REST session against the source catalog.
#[derive(Clone)]
pub struct RestSource {
    http: reqwest::Client,
    instance_url: String,
    access_token: String,
    api_version: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Deserialize)]
struct DescribeGlobalResponse {
    sobjects: Vec<SObjectInfo>,
}

#[derive(Deserialize)]
struct DescribeObjectResponse {
    fields: Vec<FieldDescriptor>,
}

#[derive(Deserialize)]
struct CreateJobResponse {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    state: String,
    #[serde(default)]
    error_message: Option<String>,
}

impl RestSource {
    /// Log in with the OAuth username-password flow and return an
    /// authenticated session bound to the org's instance URL.
    pub async fn login(config: &SourceConfig) -> Result<Self> {
        let http = reqwest::Client::new();
        let token_url = format!(
            "{}/services/oauth2/token",
            config.login_url.trim_end_matches('/')
        );

        let token: TokenResponse = http
            .post(&token_url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", config.client_id.as_str()),
                ("client_secret", config.client_secret.as_str()),
                ("username", config.username.as_str()),
                ("password", config.password.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("Connected to source org: {}", token.instance_url);

        Ok(Self {
            http,
            instance_url: token.instance_url,
            access_token: token.access_token,
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/services/data/v{}/{}",
            self.instance_url.trim_end_matches('/'),
            self.api_version,
            path
        )
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(self.url(path))
            .bearer_auth(&self.access_token)
    }

    /// Fetch one page of job results. `locator` pages past the first.
    async fn results_page(
        &self,
        job_id: &str,
        locator: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .get(&format!("jobs/query/{job_id}/results"))
            .header(reqwest::header::ACCEPT, "text/csv");
        if let Some(locator) = locator {
            request = request.query(&[("locator", locator)]);
        }
        Ok(request.send().await?.error_for_status()?)
    }
}

#[async_trait]
impl SourceApi for RestSource {
    async fn describe_global(&self) -> Result<Vec<SObjectInfo>> {
        let response: DescribeGlobalResponse = self
            .get("sobjects")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.sobjects)
    }

    async fn describe_object(&self, object: &str) -> Result<Vec<FieldDescriptor>> {
        let response: DescribeObjectResponse = self
            .get(&format!("sobjects/{object}/describe"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.fields)
    }

    async fn submit_query_job(&self, soql: &str) -> Result<String> {
        let response: CreateJobResponse = self
            .http
            .post(self.url("jobs/query"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({
                "operation": "query",
                "query": soql,
                "contentType": "CSV",
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("Submitted bulk query job {}", response.id);
        Ok(response.id)
    }

    async fn query_job_state(&self, job_id: &str) -> Result<QueryJobState> {
        let status: JobStatusResponse = self
            .get(&format!("jobs/query/{job_id}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(match status.state.as_str() {
            "UploadComplete" | "Queued" => QueryJobState::Queued,
            "InProgress" => QueryJobState::InProgress,
            "JobComplete" => QueryJobState::Complete,
            "Aborted" => QueryJobState::Aborted,
            "Failed" => QueryJobState::Failed(
                status
                    .error_message
                    .unwrap_or_else(|| "job failed without error message".to_string()),
            ),
            other => QueryJobState::Failed(format!("unexpected job state '{other}'")),
        })
    }

    async fn open_results(&self, job_id: &str) -> Result<ResultStream> {
        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let (header_tx, header_rx) = oneshot::channel();

        let first_page = self.results_page(job_id, None).await?;
        let mut locator = next_locator(&first_page);

        let session = self.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let mut page = first_page;
            let mut header_tx = Some(header_tx);

            loop {
                if let Err(e) = stream_page(page, header_tx.take(), tx.clone()).await {
                    let _ = tx.send(Err(e)).await;
                    return;
                }

                let Some(next) = locator.take() else {
                    return;
                };
                match session.results_page(&job_id, Some(&next)).await {
                    Ok(response) => {
                        locator = next_locator(&response);
                        page = response;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        let columns = header_rx.await.map_err(|_| {
            MigrateError::Io(std::io::Error::other(
                "result stream closed before the header row arrived",
            ))
        })?;

        Ok(ResultStream { columns, rows: rx })
    }
}

/// Extract the pagination locator from a results response, if any.
fn next_locator(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get("Sforce-Locator")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && *v != "null")
        .map(str::to_string)
}

/// Decode one CSV results page, forwarding data rows to `tx`.
///
/// Every page repeats the header as its first record; only the first page
/// reports it (through `header_tx`), the rest skip it.
async fn stream_page(
    response: reqwest::Response,
    mut header_tx: Option<oneshot::Sender<Vec<String>>>,
    tx: mpsc::Sender<Result<Vec<String>>>,
) -> Result<()> {
    let body = response.bytes_stream().map_err(std::io::Error::other);
    let reader = SyncIoBridge::new(StreamReader::new(Box::pin(body)));

    let decode = tokio::task::spawn_blocking(move || -> Result<()> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(reader);
        let mut first_record = true;

        for record in rdr.records() {
            let record = record?;
            if first_record {
                first_record = false;
                if let Some(header_tx) = header_tx.take() {
                    let columns = record.iter().map(str::to_string).collect();
                    let _ = header_tx.send(columns);
                }
                continue;
            }
            let row: Vec<String> = record.iter().map(str::to_string).collect();
            if tx.blocking_send(Ok(row)).is_err() {
                // Consumer went away; stop decoding.
                break;
            }
        }
        Ok(())
    });

    decode.await.map_err(|e| {
        MigrateError::Io(std::io::Error::other(format!(
            "result decode task failed: {e}"
        )))
    })?
}
