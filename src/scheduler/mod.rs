//! Placement and lifecycle core.
//!
//! The scheduler is the only writer of container and container service rows.
//! New containers go to the host the metrics source reports as least loaded;
//! status reports are checked against the container state machine before
//! they are stored.

mod error;
mod lifecycle;

pub use error::{Result, SchedulerError};
pub use lifecycle::{check_transition, Transition};

use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::agent::{self, AgentClient};
use crate::api::metrics::{record_placement, record_transition};
use crate::config::AgentConfig;
use crate::db::{
    now_rfc3339, Container, ContainerService, ContainerStatus, ContainerSummary,
    CreateContainerRequest, CreateContainerServiceRequest, DbPool, Host, RegisterHostRequest,
    ServiceStatus, UpdateContainerStatusRequest, UpdateServiceStatusRequest,
};
use crate::load::MetricsSource;

/// Status reports re-read the row this many times when they lose a race
const MAX_STATUS_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Scheduler {
    db: DbPool,
    metrics: Arc<dyn MetricsSource>,
    agent: Arc<dyn AgentClient>,
    agent_config: AgentConfig,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SchedulerError::BadInput(format!("{} is required", field)));
    }
    Ok(())
}

fn stored_status(container: &Container) -> Result<ContainerStatus> {
    container.status_enum().map_err(|e| {
        tracing::error!(container_id = %container.id, status = %container.status, "Container row has an unknown status");
        SchedulerError::CorruptRecord(e)
    })
}

impl Scheduler {
    pub fn new(
        db: DbPool,
        metrics: Arc<dyn MetricsSource>,
        agent: Arc<dyn AgentClient>,
        agent_config: AgentConfig,
    ) -> Self {
        Self {
            db,
            metrics,
            agent,
            agent_config,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    /// Place a new container on the least-loaded host and record it as `creating`.
    pub async fn create_container(&self, req: CreateContainerRequest) -> Result<Container> {
        require("name", &req.name)?;
        require("alias", &req.alias)?;

        let target = match self.metrics.lowest_load_host().await {
            Ok(target) => target,
            Err(e) => {
                record_placement("metrics_unavailable");
                tracing::warn!(error = %e, "Cannot place container without load metrics");
                return Err(e.into());
            }
        };

        let Some(host) = Host::find_by_ip(&self.db, &target.ip).await? else {
            record_placement("unknown_host");
            tracing::warn!(ip = %target.ip, "Lowest-load host is not registered");
            return Err(SchedulerError::PlacementFailed(format!(
                "no registered host with IP {}",
                target.ip
            )));
        };

        let now = now_rfc3339();
        let mut container = Container {
            id: Uuid::new_v4().to_string(),
            name: req.name,
            alias: req.alias,
            host_id: host.id.clone(),
            status: ContainerStatus::Creating.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        Container::insert(&self.db, &container).await?;
        record_placement("placed");

        tracing::info!(
            container_id = %container.id,
            name = %container.name,
            host = %host.name,
            load = target.load,
            "Placed container"
        );

        if self.agent_config.dispatch {
            self.dispatch_create(&host, &mut container).await?;
        }

        Ok(container)
    }

    async fn dispatch_create(&self, host: &Host, container: &mut Container) -> Result<()> {
        let outcome = match agent::create_container_request(
            &self.agent_config.base_url(&host.ip),
            &container.name,
            &container.alias,
        ) {
            Ok(request) => self.agent.execute_operation_request(request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(operation) if operation.is_failure() => {
                tracing::warn!(container_id = %container.id, operation_id = %operation.id, "Agent reported failed create");
                self.mark_failed(container).await?;
                Ok(())
            }
            Ok(operation) => {
                tracing::debug!(container_id = %container.id, operation_id = %operation.id, "Agent accepted create");
                Ok(())
            }
            Err(e) => {
                tracing::error!(container_id = %container.id, host = %host.name, error = %e, "Agent create failed");
                self.mark_failed(container).await?;
                Err(e.into())
            }
        }
    }

    async fn mark_failed(&self, container: &mut Container) -> Result<()> {
        let now = now_rfc3339();
        Container::set_status(&self.db, &container.id, ContainerStatus::Failed, &now).await?;
        container.status = ContainerStatus::Failed.to_string();
        container.updated_at = now;
        record_transition(ContainerStatus::Failed);
        Ok(())
    }

    pub async fn get_container(&self, id: Uuid) -> Result<Container> {
        Container::find_by_id(&self.db, &id.to_string())
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("container {} not found", id)))
    }

    /// Apply an externally reported status, enforcing the state machine.
    pub async fn update_container_status(
        &self,
        req: UpdateContainerStatusRequest,
    ) -> Result<Container> {
        let id = req.id.to_string();

        for _ in 0..MAX_STATUS_ATTEMPTS {
            let mut container = self.get_container(req.id).await?;
            let from = stored_status(&container)?;

            if check_transition(from, req.status)? == Transition::Unchanged {
                return Ok(container);
            }

            let now = now_rfc3339();
            if Container::compare_and_set_status(&self.db, &id, from, req.status, &now).await? {
                record_transition(req.status);
                tracing::info!(container_id = %id, %from, to = %req.status, "Container status changed");
                container.status = req.status.to_string();
                container.updated_at = now;
                return Ok(container);
            }

            tracing::debug!(container_id = %id, %from, "Status changed underneath update, re-reading");
        }

        let current = self.get_container(req.id).await?;
        Err(SchedulerError::InvalidTransition {
            from: stored_status(&current)?,
            to: req.status,
        })
    }

    /// Mark a container `deleting`, tell its agent when dispatch is on, then
    /// remove it together with its service rows.
    pub async fn delete_container(&self, id: Uuid) -> Result<()> {
        let container = self.get_container(id).await?;
        let id_str = container.id.as_str();

        let now = now_rfc3339();
        if !Container::set_status(&self.db, id_str, ContainerStatus::Deleting, &now).await? {
            return Err(SchedulerError::NotFound(format!("container {} not found", id)));
        }
        record_transition(ContainerStatus::Deleting);

        if self.agent_config.dispatch {
            let host = Host::find_by_id(&self.db, &container.host_id)
                .await?
                .ok_or_else(|| {
                    SchedulerError::NotFound(format!("host {} not found", container.host_id))
                })?;
            let outcome = match agent::delete_container_request(
                &self.agent_config.base_url(&host.ip),
                &container.name,
            ) {
                Ok(request) => self
                    .agent
                    .execute_operation_request(request)
                    .await
                    .and_then(|operation| operation.into_result()),
                Err(e) => Err(e),
            };
            if let Err(e) = outcome {
                tracing::error!(container_id = %id_str, host = %host.name, error = %e, "Agent delete failed, container left in deleting");
                return Err(e.into());
            }
        }

        if !Container::delete_with_services(&self.db, id_str).await? {
            return Err(SchedulerError::NotFound(format!("container {} not found", id)));
        }

        tracing::info!(container_id = %id_str, name = %container.name, "Deleted container");
        Ok(())
    }

    /// Every container with its host name. Order is unspecified.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(Container::list_summaries(&self.db).await?)
    }

    pub async fn list_containers_on_host(&self, host_name: &str) -> Result<Vec<Container>> {
        let host = Host::find_by_name(&self.db, host_name)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("host {} not found", host_name)))?;

        Ok(Container::list_by_host(&self.db, &host.id).await?)
    }

    pub async fn register_host(&self, req: RegisterHostRequest) -> Result<Host> {
        require("name", &req.name)?;
        if req.ip.parse::<IpAddr>().is_err() {
            return Err(SchedulerError::BadInput(format!(
                "{} is not a valid IP address",
                req.ip
            )));
        }

        let host = Host::insert(&self.db, req.name.trim(), &req.ip)
            .await
            .map_err(|e| SchedulerError::from_write(e, "host"))?;

        tracing::info!(host_id = %host.id, name = %host.name, ip = %host.ip, "Registered host");
        Ok(host)
    }

    pub async fn list_hosts(&self) -> Result<Vec<Host>> {
        Ok(Host::list(&self.db).await?)
    }

    /// Expose a container port on its host. The host is always the
    /// container's own host.
    pub async fn create_container_service(
        &self,
        req: CreateContainerServiceRequest,
    ) -> Result<ContainerService> {
        require("service", &req.service)?;

        let container = self.get_container(req.container_id).await?;
        if stored_status(&container)? == ContainerStatus::Deleting {
            return Err(SchedulerError::Conflict(format!(
                "container {} is being deleted",
                container.id
            )));
        }

        if ContainerService::exists_for_ports(&self.db, req.container_port, req.host_port).await? {
            return Err(SchedulerError::Conflict(format!(
                "port pair {}:{} is already mapped",
                req.container_port, req.host_port
            )));
        }

        let service = ContainerService {
            id: Uuid::new_v4().to_string(),
            service: req.service,
            container_id: container.id.clone(),
            container_port: i64::from(req.container_port),
            host_id: container.host_id.clone(),
            host_port: i64::from(req.host_port),
            container_name: container.name.clone(),
            status: ServiceStatus::Creating.to_string(),
            created_at: now_rfc3339(),
        };

        ContainerService::insert(&self.db, &service)
            .await
            .map_err(|e| SchedulerError::from_write(e, "container service"))?;

        tracing::info!(
            service_id = %service.id,
            container_id = %service.container_id,
            container_port = service.container_port,
            host_port = service.host_port,
            "Mapped container service"
        );
        Ok(service)
    }

    pub async fn list_container_services(&self) -> Result<Vec<ContainerService>> {
        Ok(ContainerService::list(&self.db).await?)
    }

    pub async fn update_service_status(
        &self,
        req: UpdateServiceStatusRequest,
    ) -> Result<ContainerService> {
        let id = req.id.to_string();
        if !ContainerService::update_status(&self.db, &id, req.status).await? {
            return Err(SchedulerError::NotFound(format!("service {} not found", id)));
        }

        ContainerService::find_by_id(&self.db, &id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(format!("service {} not found", id)))
    }
}
