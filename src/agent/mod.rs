//! Client for the agents running on each LXD host.
//!
//! Agents accept container operations over HTTP and answer with an
//! operation descriptor. The scheduler records intent first and then hands
//! the operation to the agent on the container's host.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, Request, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AgentConfig;

/// Asynchronous unit of work reported by a host agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Operation {
    /// Whether the agent already gave up on this operation
    pub fn is_failure(&self) -> bool {
        matches!(
            self.status.to_ascii_lowercase().as_str(),
            "failure" | "failed" | "error" | "cancelled"
        )
    }

    /// Turn an operation the agent gave up on into an error
    pub fn into_result(self) -> Result<Operation, AgentError> {
        if self.is_failure() {
            return Err(AgentError::OperationFailed {
                id: self.id,
                status: self.status,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid agent request: {0}")]
    InvalidRequest(String),

    #[error("Agent unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Agent returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed agent response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Agent operation {id} ended with status {status}")]
    OperationFailed { id: String, status: String },
}

#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Send a prepared request to an agent and decode the operation it returns
    async fn execute_operation_request(&self, request: Request) -> Result<Operation, AgentError>;
}

/// reqwest-backed agent client with a hard per-call timeout
pub struct HttpAgentClient {
    client: reqwest::Client,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AgentError::Transport)?;
        Ok(Self { client })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
        Self::new(Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn execute_operation_request(&self, request: Request) -> Result<Operation, AgentError> {
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self
            .client
            .execute(request)
            .await
            .map_err(AgentError::Transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(AgentError::Transport)?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body).into_owned();
            tracing::warn!(%method, %url, status = status.as_u16(), "Agent rejected operation");
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let operation: Operation = serde_json::from_slice(&body).map_err(AgentError::Decode)?;
        tracing::debug!(%method, %url, operation_id = %operation.id, status = %operation.status, "Agent accepted operation");
        Ok(operation)
    }
}

#[derive(Debug, Serialize)]
struct CreateContainerBody<'a> {
    name: &'a str,
    alias: &'a str,
}

fn parse_url(raw: &str) -> Result<Url, AgentError> {
    Url::parse(raw).map_err(|e| AgentError::InvalidRequest(format!("{}: {}", raw, e)))
}

/// Build the request asking the agent at `base_url` to create a container
pub fn create_container_request(
    base_url: &str,
    name: &str,
    alias: &str,
) -> Result<Request, AgentError> {
    let url = parse_url(&format!("{}/api/v1/containers", base_url))?;
    let body = serde_json::to_vec(&CreateContainerBody { name, alias })
        .map_err(|e| AgentError::InvalidRequest(e.to_string()))?;

    let mut request = Request::new(Method::POST, url);
    request
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    *request.body_mut() = Some(body.into());
    Ok(request)
}

/// Build the request asking the agent at `base_url` to delete a container
pub fn delete_container_request(base_url: &str, name: &str) -> Result<Request, AgentError> {
    let mut url = parse_url(&format!("{}/api/v1/containers", base_url))?;
    url.path_segments_mut()
        .map_err(|_| AgentError::InvalidRequest(base_url.to_string()))?
        .push(name);
    Ok(Request::new(Method::DELETE, url))
}
