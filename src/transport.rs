//! HTTP calls to the audio processing service.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer};

use crate::{config::ServerCfg, error::TransportError, jobs::AudioFile};

/// Body returned by `POST /audio/upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReceipt {
    /// Acceptance marker such as `accepted`; informational only.
    #[serde(default)]
    pub status: String,
    pub job_id: String,
    pub filename: String,
}

/// Job state in the service's own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Completed,
    Failed,
    /// `in_progress` and every other non-terminal marker (`queued`, `processing`, ...).
    #[serde(other)]
    InProgress,
}

/// Body returned by `GET /audio/progress/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressReport {
    pub status: RemoteStatus,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub progress: u8,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub error: Option<String>,
    /// Current pipeline step label.
    #[serde(default)]
    pub step_name: Option<String>,
    /// Processing output, present once completed.
    #[serde(default)]
    pub result: Option<String>,
}

fn null_as_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    Ok(Option::<u8>::deserialize(d)?.unwrap_or_default())
}

/// The two remote operations the controller needs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the whole file in one request and return the assigned job.
    async fn submit_file(&self, file: &AudioFile) -> Result<SubmitReceipt, TransportError>;

    /// Query the current state of a job.
    async fn fetch_status(&self, job_id: &str) -> Result<ProgressReport, TransportError>;
}

/// `Transport` backed by reqwest.
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(cfg: &ServerCfg) -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(cfg.connect_timeout())
            .build()?;
        Ok(Self::with_client(http, &cfg.base_url))
    }

    /// Reuse an existing client (shares its connection pool).
    pub fn with_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn upload_url(&self) -> String {
        format!("{}/audio/upload", self.base_url)
    }

    fn progress_url(&self, job_id: &str) -> String {
        format!(
            "{}/audio/progress/{}",
            self.base_url,
            urlencoding::encode(job_id)
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit_file(&self, file: &AudioFile) -> Result<SubmitReceipt, TransportError> {
        let bytes = tokio::fs::read(&file.path).await?;
        tracing::info!("upload request: {} ({} bytes)", file.filename, bytes.len());

        let form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(bytes)
                .file_name(file.filename.clone())
                .mime_str(&file.mime())?,
        );

        let resp = self
            .http
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await?;
        let receipt = success_or_status(resp)
            .await?
            .json::<SubmitReceipt>()
            .await?;
        tracing::info!(
            "upload accepted: job {} ({})",
            receipt.job_id,
            receipt.filename
        );
        Ok(receipt)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<ProgressReport, TransportError> {
        let resp = self.http.get(self.progress_url(job_id)).send().await?;
        let report = success_or_status(resp)
            .await?
            .json::<ProgressReport>()
            .await?;
        Ok(report)
    }
}

/// Turn a non-2xx response into `TransportError::Status`.
async fn success_or_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().clone();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!("request to {url} failed with {status}");
    Err(TransportError::Status {
        status,
        detail: error_detail(&body),
    })
}

/// Prefer the `detail` field of a JSON error body, else the raw text.
fn error_detail(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "(empty body)".to_string(),
        Err(_) => body.trim().to_string(),
    }
}
