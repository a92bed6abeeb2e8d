pub mod agent;
pub mod api;
pub mod config;
pub mod db;
pub mod load;
pub mod scheduler;
#[cfg(test)]
mod testing;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::scheduler::Scheduler;

pub struct AppState {
    pub config: Config,
    pub scheduler: Scheduler,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, scheduler: Scheduler) -> Self {
        Self {
            config,
            scheduler,
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
