//! Container models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Creating,
    Running,
    Stopped,
    Failed,
    Deleting,
}

impl ContainerStatus {
    pub const ALL: [ContainerStatus; 5] = [
        Self::Creating,
        Self::Running,
        Self::Stopped,
        Self::Failed,
        Self::Deleting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
        }
    }

    /// Statuses a host agent (or operator) may report through an update
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Running | Self::Stopped | Self::Failed)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Self::Creating),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "deleting" => Ok(Self::Deleting),
            _ => Err(format!("Unknown container status: {}", s)),
        }
    }
}

/// A managed LXC container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub alias: String,
    pub host_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Container {
    pub fn status_enum(&self) -> Result<ContainerStatus, String> {
        self.status.parse()
    }
}

/// Container joined with the name of its host, as returned by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContainerSummary {
    pub id: String,
    pub container_name: String,
    pub host_name: String,
    pub image: String,
    pub status: String,
}

/// Request to create a container
#[derive(Debug, Deserialize)]
pub struct CreateContainerRequest {
    pub name: String,
    pub alias: String,
}

/// Status report for a container
#[derive(Debug, Deserialize)]
pub struct UpdateContainerStatusRequest {
    pub id: Uuid,
    pub status: ContainerStatus,
}

/// Request to delete a container
#[derive(Debug, Deserialize)]
pub struct DeleteContainerRequest {
    pub id: Uuid,
}

const CONTAINER_COLUMNS: &str =
    "id, name, alias, lxd_id AS host_id, status, created_at, updated_at";

impl Container {
    pub async fn insert(db: &SqlitePool, container: &Container) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO lxc (id, name, alias, lxd_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&container.id)
        .bind(&container.name)
        .bind(&container.alias)
        .bind(&container.host_id)
        .bind(&container.status)
        .bind(&container.created_at)
        .bind(&container.updated_at)
        .execute(db)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(db: &SqlitePool, id: &str) -> Result<Option<Container>, sqlx::Error> {
        sqlx::query_as(&format!("SELECT {} FROM lxc WHERE id = ?", CONTAINER_COLUMNS))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_by_host(
        db: &SqlitePool,
        host_id: &str,
    ) -> Result<Vec<Container>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lxc WHERE lxd_id = ?",
            CONTAINER_COLUMNS
        ))
        .bind(host_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_summaries(db: &SqlitePool) -> Result<Vec<ContainerSummary>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT c.id AS id, c.name AS container_name, d.name AS host_name,
                   c.alias AS image, c.status AS status
            FROM lxc c
            JOIN lxd d ON c.lxd_id = d.id
            "#,
        )
        .fetch_all(db)
        .await
    }

    /// Move a container from `from` to `to`. Returns false when the row is
    /// gone or its status is no longer `from`.
    pub async fn compare_and_set_status(
        db: &SqlitePool,
        id: &str,
        from: ContainerStatus,
        to: ContainerStatus,
        updated_at: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE lxc SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to.as_str())
                .bind(updated_at)
                .bind(id)
                .bind(from.as_str())
                .execute(db)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Unconditionally set the status. Returns false when the row is absent.
    pub async fn set_status(
        db: &SqlitePool,
        id: &str,
        status: ContainerStatus,
        updated_at: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE lxc SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(updated_at)
            .bind(id)
            .execute(db)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Remove a container and its service rows in one transaction.
    /// Returns false when the container was already gone.
    pub async fn delete_with_services(db: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM lxc_services WHERE lxc_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM lxc WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() == 1)
    }
}
