//! Procedure and change-feed transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use roster_core::{FeedBatch, FieldPatch, Person, PersonDraft, PersonId, PersonTable};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// The three Person procedures.
#[async_trait]
pub trait PersonApi: Send + Sync {
    async fn get_all(&self) -> Result<Vec<Person>>;

    async fn create(&self, draft: PersonDraft) -> Result<Person>;

    async fn update(&self, id: &PersonId, patch: FieldPatch) -> Result<Person>;
}

/// Source of change notifications.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Returns the current feed cursor and epoch without waiting.
    async fn handshake(&self) -> Result<FeedBatch>;

    /// Waits up to `wait` for events after `after`.
    async fn poll(&self, after: u64, wait: Duration) -> Result<FeedBatch>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    message: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Serialize)]
struct UpdateInput<'a> {
    id: &'a PersonId,
    data: &'a FieldPatch,
}

/// Talks to `roster-server` over HTTP.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        procedure: &str,
        input: Option<Value>,
    ) -> Result<T> {
        let url = format!("{}/rpc/{}", self.base_url, procedure);
        let request = match input {
            Some(body) => self.client.post(url).json(&body),
            None => self.client.get(url),
        };
        let response = request.timeout(self.request_timeout).send().await?;
        decode(response).await
    }
}

/// Unwraps the `{"success": ..}` envelope.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await?;

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(ClientError::from_status(
                status.as_u16(),
                String::from_utf8_lossy(&body).into_owned(),
            ))
        }
        Err(e) => return Err(ClientError::ProtocolError(format!("invalid envelope: {}", e))),
    };

    if envelope.success {
        let data = envelope.data.unwrap_or(Value::Null);
        return Ok(serde_json::from_value(data)?);
    }

    let message = match envelope.error {
        Some(EnvelopeError {
            message,
            details: Some(details),
        }) => format!("{} ({})", message, details),
        Some(error) => error.message,
        None => status.to_string(),
    };
    Err(ClientError::from_status(status.as_u16(), message))
}

#[async_trait]
impl PersonApi for HttpTransport {
    async fn get_all(&self) -> Result<Vec<Person>> {
        self.call("person.getAll", None).await
    }

    async fn create(&self, draft: PersonDraft) -> Result<Person> {
        self.call("person.create", Some(serde_json::to_value(&draft)?))
            .await
    }

    async fn update(&self, id: &PersonId, patch: FieldPatch) -> Result<Person> {
        let input = UpdateInput { id, data: &patch };
        self.call("person.update", Some(serde_json::to_value(&input)?))
            .await
    }
}

#[async_trait]
impl ChangeSource for HttpTransport {
    async fn handshake(&self) -> Result<FeedBatch> {
        let response = self
            .client
            .get(format!("{}/feed", self.base_url))
            .timeout(self.request_timeout)
            .send()
            .await?;
        decode(response).await
    }

    async fn poll(&self, after: u64, wait: Duration) -> Result<FeedBatch> {
        let response = self
            .client
            .get(format!(
                "{}/feed?after={}&timeout_ms={}",
                self.base_url,
                after,
                wait.as_millis()
            ))
            .timeout(wait + self.request_timeout)
            .send()
            .await?;
        decode(response).await
    }
}

/// Talks to an in-process table and its change feed.
#[derive(Clone)]
pub struct LocalTransport {
    table: Arc<PersonTable>,
}

impl LocalTransport {
    pub fn new(table: Arc<PersonTable>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<PersonTable> {
        &self.table
    }
}

#[async_trait]
impl PersonApi for LocalTransport {
    async fn get_all(&self) -> Result<Vec<Person>> {
        Ok(self.table.find_many().as_ref().clone())
    }

    async fn create(&self, draft: PersonDraft) -> Result<Person> {
        Ok(self.table.create(draft)?)
    }

    async fn update(&self, id: &PersonId, patch: FieldPatch) -> Result<Person> {
        if id.is_placeholder() {
            return Err(ClientError::Validation(format!("'{}' is not a record id", id)));
        }
        Ok(self.table.update(id, &patch)?)
    }
}

#[async_trait]
impl ChangeSource for LocalTransport {
    async fn handshake(&self) -> Result<FeedBatch> {
        Ok(self.table.feed().handshake()?)
    }

    async fn poll(&self, after: u64, wait: Duration) -> Result<FeedBatch> {
        Ok(self.table.feed().wait_since(after, wait).await?)
    }
}
