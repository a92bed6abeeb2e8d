//! LXD host models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::common::now_rfc3339;

/// A machine running the LXD container runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub created_at: String,
}

/// Request to register a host
#[derive(Debug, Deserialize)]
pub struct RegisterHostRequest {
    pub name: String,
    pub ip: String,
}

impl Host {
    pub async fn insert(db: &SqlitePool, name: &str, ip: &str) -> Result<Host, sqlx::Error> {
        let host = Host {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            ip: ip.to_string(),
            created_at: now_rfc3339(),
        };

        sqlx::query("INSERT INTO lxd (id, name, ip, created_at) VALUES (?, ?, ?, ?)")
            .bind(&host.id)
            .bind(&host.name)
            .bind(&host.ip)
            .bind(&host.created_at)
            .execute(db)
            .await?;

        Ok(host)
    }

    pub async fn find_by_ip(db: &SqlitePool, ip: &str) -> Result<Option<Host>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, ip, created_at FROM lxd WHERE ip = ?")
            .bind(ip)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_name(db: &SqlitePool, name: &str) -> Result<Option<Host>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, ip, created_at FROM lxd WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id(db: &SqlitePool, id: &str) -> Result<Option<Host>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, ip, created_at FROM lxd WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn list(db: &SqlitePool) -> Result<Vec<Host>, sqlx::Error> {
        sqlx::query_as("SELECT id, name, ip, created_at FROM lxd ORDER BY name ASC")
            .fetch_all(db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_in_memory;

    #[tokio::test]
    async fn test_lookup_by_ip_and_name() {
        let db = init_in_memory().await.unwrap();
        let host = Host::insert(&db, "h1", "10.0.0.1").await.unwrap();

        assert_eq!(Host::find_by_ip(&db, "10.0.0.1").await.unwrap(), Some(host.clone()));
        assert_eq!(Host::find_by_name(&db, "h1").await.unwrap(), Some(host.clone()));
        assert_eq!(Host::find_by_id(&db, &host.id).await.unwrap(), Some(host));
        assert!(Host::find_by_ip(&db, "10.0.0.2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_name_and_ip_are_unique() {
        let db = init_in_memory().await.unwrap();
        Host::insert(&db, "h1", "10.0.0.1").await.unwrap();

        assert!(Host::insert(&db, "h1", "10.0.0.2").await.is_err());
        assert!(Host::insert(&db, "h2", "10.0.0.1").await.is_err());
        assert_eq!(Host::list(&db).await.unwrap().len(), 1);
    }
}
