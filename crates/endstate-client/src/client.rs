//! HTTP client for the chat endpoints.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use endstate_core::{ChatEvent, ChatMessage, SessionId};

use crate::error::{ClientError, Result};
use crate::sse::SseDecoder;

const REQUEST_ID_HEADER: &str = "X-Request-ID";
const DEFAULT_SEND_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Server reply to a send.
#[derive(Debug, Clone, Deserialize)]
pub struct SendReceipt {
    pub session_id: SessionId,
    pub request_id: String,
    pub message: ChatMessage,
    /// The server had already processed this request id.
    pub duplicate: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesSnapshot {
    pub session_id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub processing: bool,
}

#[derive(Debug, Deserialize)]
struct ResetReply {
    cleared: usize,
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    session_id: SessionId,
    send_retries: u32,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_id,
            send_retries: DEFAULT_SEND_RETRIES,
        }
    }

    /// Extra attempts made when a send fails in transit.
    pub fn with_send_retries(mut self, retries: u32) -> Self {
        self.send_retries = retries;
        self
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Send a user message under a fresh request id.
    pub async fn send(&self, content: &str) -> Result<SendReceipt> {
        self.send_with_id(content, &Uuid::new_v4().to_string()).await
    }

    /// Send under a caller-chosen request id.
    ///
    /// Transport failures are retried with the same id, so a request that
    /// did reach the server is answered from its idempotency table instead
    /// of starting a second turn.
    pub async fn send_with_id(&self, content: &str, request_id: &str) -> Result<SendReceipt> {
        let mut attempt = 0;
        loop {
            match self.try_send(content, request_id).await {
                Err(e) if e.is_transport() && attempt < self.send_retries => {
                    attempt += 1;
                    tracing::warn!(request_id, attempt, error = %e, "Send failed; retrying");
                    tokio::time::sleep(RETRY_DELAY * attempt).await;
                }
                result => return result,
            }
        }
    }

    async fn try_send(&self, content: &str, request_id: &str) -> Result<SendReceipt> {
        let response = self
            .http
            .post(self.url("messages"))
            .header(REQUEST_ID_HEADER, request_id)
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(ClientError::Busy(error_text(response).await));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: error_text(response).await,
            });
        }
        Ok(response.json().await?)
    }

    /// Transcript, optionally only messages newer than `since`.
    pub async fn messages(&self, since: Option<DateTime<Utc>>) -> Result<MessagesSnapshot> {
        let mut request = self.http.get(self.url("messages"));
        if let Some(since) = since {
            request = request.query(&[(
                "since",
                since.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )]);
        }
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Clear the session on the server. Returns the number of messages removed.
    pub async fn reset(&self) -> Result<usize> {
        let response = checked(self.http.post(self.url("reset")).send().await?).await?;
        let reply: ResetReply = response.json().await?;
        Ok(reply.cleared)
    }

    /// Open the session's event stream.
    ///
    /// The stream ends when the server closes the connection; a transport
    /// error is yielded as the last item.
    pub async fn stream(&self) -> Result<impl Stream<Item = Result<ChatEvent>>> {
        let response = self
            .http
            .get(self.url("stream"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let mut bytes = checked(response).await?.bytes_stream();

        Ok(async_stream::stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(ClientError::from(e));
                        break;
                    }
                };
                for frame in decoder.push(&chunk) {
                    match ChatEvent::from_sse(&frame.event, &frame.data) {
                        Ok(event) => yield Ok(event),
                        Err(e) => tracing::warn!(event = %frame.event, error = %e, "Skipping undecodable event"),
                    }
                }
            }
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/chat/{}/{endpoint}", self.base_url, self.session_id)
    }
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ClientError::Status {
        status: status.as_u16(),
        body: error_text(response).await,
    })
}

/// The `error` field of a JSON error body, or the raw body.
async fn error_text(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or(body)
}
