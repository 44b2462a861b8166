//! Outbound HTTP transport for synchronization calls.
//!
//! The synchronizer talks to sources through the [`SourceClient`] trait so
//! tests can stub the wire; [`HttpSourceClient`] is the reqwest-backed
//! implementation used in production.

use async_trait::async_trait;
use serde_json::Value as Json;

use crate::config::config;
use crate::schema::entity::SourceAuth;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMethod {
    Post,
    Put,
    Delete,
}

/// One outbound call, fully owned so it can cross an await point without
/// borrowing the object graph.
#[derive(Debug, Clone)]
pub struct SourceCall {
    pub method: SourceMethod,
    pub url: String,
    pub auth: SourceAuth,
    pub body: Option<Json>,
}

/// Result of a source call. Failures carry a human-readable message, which
/// ends up verbatim in the object's error collection; transport errors and
/// non-2xx responses both land here rather than as `Err` values, because a
/// misbehaving source is a data problem, not a programmer error.
#[derive(Debug, Clone)]
pub enum SourceOutcome {
    Success { status: u16, body: Json },
    Failure { status: Option<u16>, message: String },
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn call(&self, call: SourceCall) -> SourceOutcome;
}

pub struct HttpSourceClient {
    client: reqwest::Client,
}

impl HttpSourceClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let sync = &config().sync;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(sync.call_timeout_secs))
            .connect_timeout(std::time::Duration::from_secs(sync.connect_timeout_secs))
            .user_agent(sync.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn call(&self, call: SourceCall) -> SourceOutcome {
        let mut request = match call.method {
            SourceMethod::Post => self.client.post(&call.url),
            SourceMethod::Put => self.client.put(&call.url),
            SourceMethod::Delete => self.client.delete(&call.url),
        };
        request = match &call.auth {
            SourceAuth::None => request,
            SourceAuth::ApiKey { header, key } => request.header(header, key),
            SourceAuth::Bearer { token } => request.bearer_auth(token),
            SourceAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };
        if let Some(body) = &call.body {
            request = request.json(body);
        }

        match request.send().await {
            Err(err) if err.is_timeout() => SourceOutcome::Failure {
                status: None,
                message: format!("request to {} timed out", call.url),
            },
            Err(err) => SourceOutcome::Failure { status: None, message: err.to_string() },
            Ok(response) => {
                let status = response.status().as_u16();
                // Sources are not guaranteed to return JSON on errors
                let body = response.json::<Json>().await.unwrap_or(Json::Null);
                if (200..300).contains(&status) {
                    SourceOutcome::Success { status, body }
                } else {
                    SourceOutcome::Failure {
                        status: Some(status),
                        message: failure_message(status, &body),
                    }
                }
            }
        }
    }
}

/// Best human-readable message a source gave us for a failed call. Checks
/// the conventional `message` field, then the hydra vocabulary used by API
/// Platform style sources, then falls back to the status code.
fn failure_message(status: u16, body: &Json) -> String {
    body.get("message")
        .and_then(|m| m.as_str())
        .or_else(|| body.get("hydra:description").and_then(|m| m.as_str()))
        .map(|m| m.to_string())
        .unwrap_or_else(|| format!("source returned status {status}"))
}
