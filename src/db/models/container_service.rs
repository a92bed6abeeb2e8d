//! Container service models: port mappings from a container to its host.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::common::Port;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Creating,
    Active,
    Removing,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Removing => "removing",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database row for a container service
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContainerService {
    pub id: String,
    pub service: String,
    pub container_id: String,
    pub container_port: i64,
    pub host_id: String,
    pub host_port: i64,
    pub container_name: String,
    pub status: String,
    pub created_at: String,
}

/// Response DTO for ContainerService
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerServiceResponse {
    pub id: String,
    pub service: String,
    pub container_id: String,
    pub container_port: u16,
    pub host_id: String,
    pub host_port: u16,
    pub container_name: String,
    pub status: String,
    pub created_at: String,
}

impl From<ContainerService> for ContainerServiceResponse {
    fn from(s: ContainerService) -> Self {
        // Both port columns carry a 1-65535 CHECK constraint
        Self {
            id: s.id,
            service: s.service,
            container_id: s.container_id,
            container_port: s.container_port as u16,
            host_id: s.host_id,
            host_port: s.host_port as u16,
            container_name: s.container_name,
            status: s.status,
            created_at: s.created_at,
        }
    }
}

/// Request to expose a container service on a host port
#[derive(Debug, Deserialize)]
pub struct CreateContainerServiceRequest {
    pub service: String,
    pub container_id: Uuid,
    pub container_port: Port,
    pub host_port: Port,
}

/// Status change for a container service
#[derive(Debug, Deserialize)]
pub struct UpdateServiceStatusRequest {
    pub id: Uuid,
    pub status: ServiceStatus,
}

const SERVICE_COLUMNS: &str = "id, service, lxc_id AS container_id, lxc_port AS container_port, \
     lxd_id AS host_id, lxd_port AS host_port, lxc_name AS container_name, status, created_at";

impl ContainerService {
    pub async fn insert(db: &SqlitePool, service: &ContainerService) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO lxc_services (id, service, lxc_id, lxc_port, lxd_id, lxd_port, lxc_name, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&service.id)
        .bind(&service.service)
        .bind(&service.container_id)
        .bind(service.container_port)
        .bind(&service.host_id)
        .bind(service.host_port)
        .bind(&service.container_name)
        .bind(&service.status)
        .bind(&service.created_at)
        .execute(db)
        .await?;

        Ok(())
    }

    /// Whether some service already claims this inside/outside port pair
    pub async fn exists_for_ports(
        db: &SqlitePool,
        container_port: Port,
        host_port: Port,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lxc_services WHERE lxc_port = ? AND lxd_port = ?",
        )
        .bind(i64::from(container_port))
        .bind(i64::from(host_port))
        .fetch_one(db)
        .await?;

        Ok(count > 0)
    }

    pub async fn find_by_id(
        db: &SqlitePool,
        id: &str,
    ) -> Result<Option<ContainerService>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lxc_services WHERE id = ?",
            SERVICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn list(db: &SqlitePool) -> Result<Vec<ContainerService>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lxc_services ORDER BY created_at ASC",
            SERVICE_COLUMNS
        ))
        .fetch_all(db)
        .await
    }

    pub async fn list_for_container(
        db: &SqlitePool,
        container_id: &str,
    ) -> Result<Vec<ContainerService>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lxc_services WHERE lxc_id = ?",
            SERVICE_COLUMNS
        ))
        .bind(container_id)
        .fetch_all(db)
        .await
    }

    /// Returns false when the service row is absent
    pub async fn update_status(
        db: &SqlitePool,
        id: &str,
        status: ServiceStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE lxc_services SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_rejects_bad_ports() {
        let ok = r#"{"service":"ssh","container_id":"7d4a4f7e-7c4e-4b0e-9a3a-0c3f0e6f2d11","container_port":22,"host_port":2222}"#;
        let req: CreateContainerServiceRequest = serde_json::from_str(ok).unwrap();
        assert_eq!(req.container_port.get(), 22);
        assert_eq!(req.host_port.get(), 2222);

        let zero = ok.replace("2222", "0");
        assert!(serde_json::from_str::<CreateContainerServiceRequest>(&zero).is_err());

        let text = ok.replace("2222", "\"2222\"");
        assert!(serde_json::from_str::<CreateContainerServiceRequest>(&text).is_err());
    }

    #[test]
    fn test_service_status_names() {
        let status: ServiceStatus = serde_json::from_str("\"active\"").unwrap();
        assert_eq!(status, ServiceStatus::Active);
        assert!(serde_json::from_str::<ServiceStatus>("\"assigned\"").is_err());
    }
}
