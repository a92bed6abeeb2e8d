//! Host load telemetry used for placement.
//!
//! The scheduler only ever asks one question: which host is the least loaded
//! right now. The Prometheus-backed source answers it from an instant query
//! and keeps the answer for one poll interval.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::MetricsConfig;

/// Load sample for one host, keyed by the address its agent listens on
#[derive(Debug, Clone, PartialEq)]
pub struct HostLoad {
    pub ip: String,
    pub load: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Metrics backend unavailable: {0}")]
    Unavailable(String),

    #[error("Metrics backend returned no load samples")]
    NoSamples,

    #[error("Malformed metrics response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// The host currently exhibiting the lowest load
    async fn lowest_load_host(&self) -> Result<HostLoad, MetricsError>;
}

/// Pick the sample with the smallest load. Ties go to the lexicographically
/// smallest IP so repeated calls over the same samples agree.
pub fn pick_lowest(samples: &[HostLoad]) -> Option<&HostLoad> {
    samples
        .iter()
        .filter(|s| s.load.is_finite())
        .min_by(|a, b| a.load.total_cmp(&b.load).then_with(|| a.ip.cmp(&b.ip)))
}

/// Strip the exporter port from a Prometheus `instance` label.
fn instance_ip(instance: &str) -> &str {
    if let Some(rest) = instance.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match instance.rsplit_once(':') {
        Some((host, _)) if !host.contains(':') => host,
        _ => instance,
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Turn a Prometheus instant-query body into per-host load samples
fn parse_query_response(body: &[u8]) -> Result<Vec<HostLoad>, MetricsError> {
    let response: QueryResponse =
        serde_json::from_slice(body).map_err(|e| MetricsError::Decode(e.to_string()))?;

    if response.status != "success" {
        return Err(MetricsError::Unavailable(
            response.error.unwrap_or_else(|| response.status.clone()),
        ));
    }

    let samples = response
        .data
        .map(|d| d.result)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|sample| {
            let instance = sample.metric.get("instance")?;
            let load = sample.value.1.parse::<f64>().ok()?;
            Some(HostLoad {
                ip: instance_ip(instance).to_string(),
                load,
            })
        })
        .collect();

    Ok(samples)
}

struct CachedPick {
    fetched_at: Instant,
    host: HostLoad,
}

/// Metrics source backed by the Prometheus HTTP API
pub struct PrometheusMetricsSource {
    client: reqwest::Client,
    base_url: String,
    query: String,
    poll_interval: Duration,
    cache: Mutex<Option<CachedPick>>,
}

impl PrometheusMetricsSource {
    pub fn new(config: &MetricsConfig) -> Result<Self, MetricsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.prometheus_url.trim_end_matches('/').to_string(),
            query: config.load_query.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            cache: Mutex::new(None),
        })
    }

    fn cached(&self) -> Option<HostLoad> {
        let cache = self.cache.lock();
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.poll_interval)
            .map(|c| c.host.clone())
    }

    async fn fetch_samples(&self) -> Result<Vec<HostLoad>, MetricsError> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", self.query.as_str())])
            .send()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| MetricsError::Unavailable(e.to_string()))?;

        // Prometheus reports query errors with a JSON body on 4xx
        if status.is_server_error() {
            return Err(MetricsError::Unavailable(format!("Prometheus returned {}", status)));
        }

        parse_query_response(&body)
    }
}

#[async_trait]
impl MetricsSource for PrometheusMetricsSource {
    async fn lowest_load_host(&self) -> Result<HostLoad, MetricsError> {
        if let Some(host) = self.cached() {
            return Ok(host);
        }

        let samples = self.fetch_samples().await?;
        let host = pick_lowest(&samples).cloned().ok_or(MetricsError::NoSamples)?;

        tracing::debug!(ip = %host.ip, load = host.load, candidates = samples.len(), "Refreshed lowest-load host");

        *self.cache.lock() = Some(CachedPick {
            fetched_at: Instant::now(),
            host: host.clone(),
        });
        Ok(host)
    }
}
