// HTTP Submission Handler

use async_trait::async_trait;
use fieldsync_core::domain::{Payload, QueueItem};
use fieldsync_core::port::{SubmissionError, SubmissionHandler};
use std::time::Duration;
use tracing::debug;

type Result<T> = std::result::Result<T, SubmissionError>;

/// Backend endpoints and credentials
#[derive(Debug, Clone)]
pub struct HttpHandlerConfig {
    /// Backend base URL, no trailing slash
    pub base_url: String,
    /// Bearer token for the REST and storage APIs
    pub api_token: String,
    /// Storage bucket receiving media uploads
    pub bucket: String,
    /// Object key prefix inside the bucket
    pub object_prefix: String,
    /// Request-level timeout; a slow backend becomes an ordinary
    /// delivery failure instead of stalling the flush indefinitely
    pub request_timeout: Duration,
}

impl HttpHandlerConfig {
    pub fn new(base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: api_token.into(),
            bucket: "media".to_string(),
            object_prefix: "inspections".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Delivers queued items to the hosted backend: form bodies to the REST
/// submissions endpoint, media blobs to the storage API.
///
/// Replay is idempotent: forms carry the client item id for server-side
/// dedup, and media object keys are derived from the item so a retried
/// upload overwrites its own previous attempt.
pub struct HttpSubmissionHandler {
    client: reqwest::Client,
    config: HttpHandlerConfig,
}

impl HttpSubmissionHandler {
    pub fn new(config: HttpHandlerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SubmissionError::Other(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn submissions_url(&self) -> String {
        format!("{}/rest/v1/inspection_submissions", self.config.base_url)
    }

    fn object_url(&self, item: &QueueItem, file_name: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.config.base_url,
            self.config.bucket,
            object_key(&self.config.object_prefix, item, file_name)
        )
    }

    async fn deliver_form(&self, item: &QueueItem, body: &serde_json::Value) -> Result<()> {
        let request_body = serde_json::json!({
            "client_item_id": item.id,
            "submission": body,
            "metadata": item.metadata,
        });

        let response = self
            .client
            .post(self.submissions_url())
            .bearer_auth(&self.config.api_token)
            .json(&request_body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        check_status(response).await
    }

    async fn deliver_media(
        &self,
        item: &QueueItem,
        file_name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let response = self
            .client
            .post(self.object_url(item, file_name))
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            // Retried uploads land on the same key
            .header("x-upsert", "true")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        check_status(response).await
    }
}

#[async_trait]
impl SubmissionHandler for HttpSubmissionHandler {
    async fn deliver(&self, item: &QueueItem) -> Result<()> {
        debug!(item_id = %item.id, kind = %item.payload.kind(), "Delivering item");

        match &item.payload {
            Payload::Form { body } => self.deliver_form(item, body).await,
            Payload::Media {
                file_name,
                content_type,
                bytes,
            } => {
                self.deliver_media(item, file_name, content_type, bytes)
                    .await
            }
        }
    }
}

/// Object key unique per item but stable across retries
fn object_key(prefix: &str, item: &QueueItem, file_name: &str) -> String {
    let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("bin");
    format!("{}/{}-{}.{}", prefix, item.enqueued_at, item.id, extension)
}

fn map_reqwest_error(err: reqwest::Error) -> SubmissionError {
    if err.is_timeout() {
        SubmissionError::Timeout
    } else {
        SubmissionError::Network(err.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let mut message = response.text().await.unwrap_or_default();
    message.truncate(200);
    Err(SubmissionError::Rejected {
        status: status.as_u16(),
        message,
    })
}
