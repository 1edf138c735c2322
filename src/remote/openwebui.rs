//! Open WebUI client.
//!
//! Talks to the knowledge and files APIs of an Open WebUI instance. Every
//! request carries `Authorization: Bearer <token>`.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list knowledge bases | `GET /api/v1/knowledge/` |
//! | create knowledge base | `POST /api/v1/knowledge/create` |
//! | list attached files | `GET /api/v1/knowledge/{id}` |
//! | upload | `POST /api/v1/files/` (multipart, streamed) |
//! | processing status | `GET /api/v1/files/{id}/process/status` |
//! | attach | `POST /api/v1/knowledge/{id}/file/add` |
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::RemoteError;
use crate::kb_config::KnowledgeBaseConfig;
use crate::models::{LocalFileRef, ProcessingStatus, RemoteFileSet, RemoteKnowledgeBase};
use crate::remote::RemoteService;

pub struct OpenWebUi {
    client: Client,
    base_url: String,
    token: String,
    max_retries: u32,
    retry_backoff: Duration,
}

impl OpenWebUi {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            max_retries,
            retry_backoff: Duration::from_secs(1),
        })
    }

    /// Build a client from `[remote]` settings and `OPENWEBUI_API_KEY`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            &config.remote.base_url,
            config.api_key()?,
            Duration::from_secs(config.remote.timeout_secs),
            config.remote.max_retries,
        )
    }

    /// Override the base delay of the exponential backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send the request produced by `build`, retrying transient failures.
    ///
    /// `build` is called once per attempt so streamed bodies can be reopened.
    async fn send<F>(&self, url: &str, build: F) -> Result<Response, RemoteError>
    where
        F: Fn() -> Result<RequestBuilder, RemoteError>,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_backoff * (1u32 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let request = build()?.bearer_auth(&self.token);
            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let body = response.text().await.unwrap_or_default();
                    RemoteError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(source) => RemoteError::Transport {
                    url: url.to_string(),
                    source,
                },
            };

            if !err.is_transient() {
                return Err(err);
            }
            tracing::warn!(url, attempt, error = %err, "transient remote error");
            last_err = Some(err);
        }

        Err(last_err.unwrap_or_else(|| RemoteError::Decode {
            url: url.to_string(),
            message: "request was never attempted".to_string(),
        }))
    }

    async fn send_json<F>(&self, url: &str, build: F) -> Result<Value, RemoteError>
    where
        F: Fn() -> Result<RequestBuilder, RemoteError>,
    {
        let response = self.send(url, build).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| decode_error(url, e.to_string()))
    }
}

#[async_trait]
impl RemoteService for OpenWebUi {
    async fn list_knowledge_bases(&self) -> Result<Vec<RemoteKnowledgeBase>, RemoteError> {
        let url = self.url("/api/v1/knowledge/");
        let json = self
            .send_json(&url, || Ok(self.client.get(&url)))
            .await?;
        parse_knowledge_bases(&url, &json)
    }

    async fn create_knowledge_base(
        &self,
        config: &KnowledgeBaseConfig,
    ) -> Result<String, RemoteError> {
        let url = self.url("/api/v1/knowledge/create");
        // Open WebUI treats a null access_control as public.
        let access_control = if config.public { Value::Null } else { json!({}) };
        let body = json!({
            "name": config.name,
            "description": config.description,
            "access_control": access_control,
        });

        match self
            .send_json(&url, || Ok(self.client.post(&url).json(&body)))
            .await
        {
            Ok(json) => id_field(&url, &json),
            Err(RemoteError::Status { status, body, .. }) if is_conflict(status, &body) => {
                Err(RemoteError::AlreadyExists(config.name.clone()))
            }
            Err(e) => Err(e),
        }
    }

    async fn list_files(&self, kb_id: &str) -> Result<RemoteFileSet, RemoteError> {
        let url = self.url(&format!("/api/v1/knowledge/{}", kb_id));
        let json = self
            .send_json(&url, || Ok(self.client.get(&url)))
            .await?;
        parse_file_names(&url, &json)
    }

    async fn upload_file(&self, file: &LocalFileRef) -> Result<String, RemoteError> {
        let url = self.url("/api/v1/files/");
        let json = self
            .send_json(&url, || {
                let form = Form::new().part("file", streamed_part(file)?);
                Ok(self
                    .client
                    .post(&url)
                    .header("Accept", "application/json")
                    .multipart(form))
            })
            .await?;
        id_field(&url, &json)
    }

    async fn file_status(&self, file_id: &str) -> Result<ProcessingStatus, RemoteError> {
        let url = self.url(&format!("/api/v1/files/{}/process/status", file_id));
        let json = self
            .send_json(&url, || Ok(self.client.get(&url)))
            .await?;
        let status = json
            .get("status")
            .and_then(|s| s.as_str())
            .ok_or_else(|| decode_error(&url, "missing status"))?;
        Ok(ProcessingStatus::parse(status))
    }

    async fn attach_file(&self, kb_id: &str, file_id: &str) -> Result<(), RemoteError> {
        let url = self.url(&format!("/api/v1/knowledge/{}/file/add", kb_id));
        let body = json!({ "file_id": file_id });
        self.send(&url, || Ok(self.client.post(&url).json(&body)))
            .await?;
        Ok(())
    }
}

/// Multipart part streaming the file from disk.
fn streamed_part(file: &LocalFileRef) -> Result<Part, RemoteError> {
    let io_err = |source| RemoteError::LocalIo {
        path: file.path.clone(),
        source,
    };
    let handle = std::fs::File::open(&file.path).map_err(io_err)?;
    let len = handle.metadata().map_err(io_err)?.len();
    let stream = ReaderStream::new(tokio::fs::File::from_std(handle));

    Ok(Part::stream_with_length(Body::wrap_stream(stream), len).file_name(file.name.clone()))
}

fn is_conflict(status: u16, body: &str) -> bool {
    status == 409 || (status == 400 && body.to_ascii_lowercase().contains("already exist"))
}

fn decode_error(url: &str, message: impl Into<String>) -> RemoteError {
    RemoteError::Decode {
        url: url.to_string(),
        message: message.into(),
    }
}

fn id_field(url: &str, json: &Value) -> Result<String, RemoteError> {
    json.get("id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| decode_error(url, "missing id"))
}

/// Accepts both a bare array and a paginated `{ "items": [...] }` object.
fn parse_knowledge_bases(url: &str, json: &Value) -> Result<Vec<RemoteKnowledgeBase>, RemoteError> {
    let items = json
        .as_array()
        .or_else(|| json.get("items").and_then(|i| i.as_array()))
        .ok_or_else(|| decode_error(url, "expected a list of knowledge bases"))?;

    Ok(items
        .iter()
        .filter_map(|item| {
            let id = item.get("id")?.as_str()?;
            let name = item.get("name")?.as_str()?;
            Some(RemoteKnowledgeBase {
                id: id.to_string(),
                name: name.to_string(),
            })
        })
        .collect())
}

/// File names come from `meta.name`, falling back to `filename`.
fn parse_file_names(url: &str, json: &Value) -> Result<RemoteFileSet, RemoteError> {
    if !json.is_object() {
        return Err(decode_error(url, "expected a knowledge base object"));
    }
    let Some(files) = json.get("files").and_then(|f| f.as_array()) else {
        return Ok(RemoteFileSet::new());
    };

    Ok(files
        .iter()
        .filter_map(|f| {
            f.get("meta")
                .and_then(|m| m.get("name"))
                .or_else(|| f.get("filename"))
                .and_then(|n| n.as_str())
                .map(str::to_string)
        })
        .collect())
}
