//! Test doubles for the metrics source and the host agent.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, Request};
use std::sync::Arc;

use crate::agent::{AgentClient, AgentError, Operation};
use crate::config::AgentConfig;
use crate::db::{self, DbPool, Host};
use crate::load::{HostLoad, MetricsError, MetricsSource};
use crate::scheduler::Scheduler;

/// Always names the same host, or fails when `ip` is None
pub struct FixedMetrics {
    pub ip: Mutex<Option<String>>,
}

impl FixedMetrics {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: Mutex::new(Some(ip.to_string())),
        }
    }
}

#[async_trait]
impl MetricsSource for FixedMetrics {
    async fn lowest_load_host(&self) -> Result<HostLoad, MetricsError> {
        match self.ip.lock().clone() {
            Some(ip) => Ok(HostLoad { ip, load: 0.0 }),
            None => Err(MetricsError::Unavailable("connection refused".to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentBehaviour {
    Accept,
    FailOperation,
    Unreachable,
}

/// Records every request and answers according to `behaviour`
pub struct RecordingAgent {
    pub behaviour: Mutex<AgentBehaviour>,
    pub requests: Mutex<Vec<(Method, String)>>,
}

impl RecordingAgent {
    pub fn new(behaviour: AgentBehaviour) -> Self {
        Self {
            behaviour: Mutex::new(behaviour),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AgentClient for RecordingAgent {
    async fn execute_operation_request(&self, request: Request) -> Result<Operation, AgentError> {
        self.requests
            .lock()
            .push((request.method().clone(), request.url().to_string()));

        match *self.behaviour.lock() {
            AgentBehaviour::Accept => Ok(Operation {
                id: "op-1".to_string(),
                status: "Running".to_string(),
                metadata: serde_json::Value::Null,
            }),
            AgentBehaviour::FailOperation => Ok(Operation {
                id: "op-1".to_string(),
                status: "Failure".to_string(),
                metadata: serde_json::Value::Null,
            }),
            AgentBehaviour::Unreachable => Err(AgentError::Status {
                status: 503,
                body: "agent down".to_string(),
            }),
        }
    }
}

pub struct Harness {
    pub db: DbPool,
    pub metrics: Arc<FixedMetrics>,
    pub agent: Arc<RecordingAgent>,
    pub scheduler: Scheduler,
}

/// In-memory scheduler whose metrics source names `10.0.0.1`
pub async fn harness(dispatch: bool) -> Harness {
    let db = db::init_in_memory().await.unwrap();
    let metrics = Arc::new(FixedMetrics::new("10.0.0.1"));
    let agent = Arc::new(RecordingAgent::new(AgentBehaviour::Accept));
    let agent_config = AgentConfig {
        dispatch,
        ..AgentConfig::default()
    };

    let scheduler = Scheduler::new(db.clone(), metrics.clone(), agent.clone(), agent_config);
    Harness {
        db,
        metrics,
        agent,
        scheduler,
    }
}

pub async fn register(db: &DbPool, name: &str, ip: &str) -> Host {
    Host::insert(db, name, ip).await.unwrap()
}
