use crate::agent::AgentError;
use crate::db::ContainerStatus;
use crate::load::MetricsError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("{0}")]
    BadInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Placement failed: {0}")]
    PlacementFailed(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: ContainerStatus,
        to: ContainerStatus,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Stored record is invalid: {0}")]
    CorruptRecord(String),

    #[error(transparent)]
    MetricsUnavailable(#[from] MetricsError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl SchedulerError {
    /// Map constraint violations reported by the store to the matching kind,
    /// leaving everything else as a storage failure.
    pub(crate) fn from_write(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return SchedulerError::Conflict(format!("{} already exists", what));
            }
            if db_err.is_foreign_key_violation() {
                return SchedulerError::NotFound(format!("{} references a missing record", what));
            }
        }
        SchedulerError::Storage(err)
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
