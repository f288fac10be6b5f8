use std::time::Duration;

use anyhow::Context;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::sync::{Listing, SyncError, TaskStore};
use crate::task::{Task, TaskId};

/// `{status, obj, msg}` wrapper the store puts around every reply.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: Option<String>,
    obj: Option<T>,
    msg: Option<String>,
}

impl<T> Envelope<T> {
    fn rejection(&self) -> Option<SyncError> {
        match self.status.as_deref() {
            Some("error") => Some(SyncError::Rejected(
                self.msg
                    .clone()
                    .unwrap_or_else(|| "the task store reported an error".to_string()),
            )),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTaskStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTaskStore {
    /// `base_url` is the task collection endpoint, e.g.
    /// `http://127.0.0.1:8080/tasks/`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed building HTTP client for the task store")?;

        let mut base_url = base_url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn json_request<B>(&self, method: Method, path: &str, body: &B) -> Result<RequestBuilder, SyncError>
    where
        B: serde::Serialize,
    {
        let payload = serde_json::to_string(body)
            .map_err(|err| SyncError::Decode(format!("failed encoding request body: {err}")))?;
        Ok(self
            .request(method, path)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload))
    }

    /// Sends `request` and returns the status and raw body.
    async fn exchange(&self, request: RequestBuilder, op: &str) -> Result<(StatusCode, String), SyncError> {
        let request_id = Uuid::new_v4();
        debug!(%request_id, op, "sending request to task store");

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%request_id, op, error = %err, "task store request failed");
                return Err(SyncError::Transport(err));
            }
        };

        let status = response.status();
        let body = response.text().await?;
        debug!(%request_id, op, status = %status, body_len = body.len(), "task store replied");
        Ok((status, body))
    }
}

impl TaskStore for HttpTaskStore {
    #[instrument(skip_all)]
    async fn create(&self, draft: &Task) -> Result<Task, SyncError> {
        let request = self.json_request(Method::POST, "", draft)?;
        let (status, body) = self.exchange(request, "create").await?;
        decode_object(status, &body)
    }

    #[instrument(skip_all, fields(id = ?task.id))]
    async fn update(&self, task: &Task) -> Result<Task, SyncError> {
        let request = self.json_request(Method::POST, "", task)?;
        let (status, body) = self.exchange(request, "update").await?;
        decode_object(status, &body)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn remove(&self, id: &TaskId) -> Result<Option<String>, SyncError> {
        let request = self.request(Method::DELETE, id.as_str());
        let (status, body) = self.exchange(request, "remove").await?;
        decode_ack(status, &body)
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Listing, SyncError> {
        let request = self.request(Method::GET, "");
        let (status, body) = self.exchange(request, "list").await?;
        decode_listing(status, &body)
    }

    #[instrument(skip_all, fields(message_len = message.len()))]
    async fn commit_all(&self, message: &str) -> Result<(), SyncError> {
        let request = self.json_request(Method::POST, "commit", &serde_json::json!({ "msg": message }))?;
        let (status, body) = self.exchange(request, "commit").await?;
        decode_ack(status, &body).map(|_| ())
    }
}

/// Error for a non-success reply: the body's `msg` when it has one.
fn failure(status: StatusCode, body: &str) -> SyncError {
    let parsed = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.msg);
    let msg = parsed.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            trimmed.to_string()
        }
    });
    SyncError::Status {
        status: status.as_u16(),
        msg,
    }
}

fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<Envelope<T>, SyncError> {
    if !status.is_success() {
        return Err(failure(status, body));
    }
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|err| SyncError::Decode(format!("invalid task store reply: {err}")))?;
    match envelope.rejection() {
        Some(rejection) => Err(rejection),
        None => Ok(envelope),
    }
}

fn decode_object(status: StatusCode, body: &str) -> Result<Task, SyncError> {
    decode_envelope::<Task>(status, body)?
        .obj
        .ok_or_else(|| SyncError::Decode("reply has no obj".to_string()))
}

fn decode_listing(status: StatusCode, body: &str) -> Result<Listing, SyncError> {
    let envelope = decode_envelope::<Listing>(status, body)?;
    if let Some(other) = envelope.status.as_deref()
        && other != "success"
    {
        return Err(SyncError::Rejected(
            envelope
                .msg
                .unwrap_or_else(|| format!("listing returned status {other:?}")),
        ));
    }
    envelope
        .obj
        .ok_or_else(|| SyncError::Decode("listing has no obj".to_string()))
}

/// Replies for delete and commit only signal success; an empty body counts.
fn decode_ack(status: StatusCode, body: &str) -> Result<Option<String>, SyncError> {
    if status.is_success() && body.trim().is_empty() {
        return Ok(None);
    }
    decode_envelope::<serde_json::Value>(status, body).map(|envelope| envelope.msg)
}
