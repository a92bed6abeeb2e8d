//! Container state machine.
//!
//! ```text
//! creating -> running | failed
//! running  -> stopped | failed
//! stopped  -> running | failed
//! failed   -> running
//! deleting -> (row removal only)
//! ```
//!
//! Only `running`, `stopped` and `failed` may be reported from outside;
//! `creating` is set on insert and `deleting` by the delete path.

use super::error::{Result, SchedulerError};
use crate::db::ContainerStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status must be written
    Apply,
    /// The container is already in the reported status
    Unchanged,
}

pub fn check_transition(from: ContainerStatus, to: ContainerStatus) -> Result<Transition> {
    use ContainerStatus::*;

    if !to.is_reportable() {
        return Err(SchedulerError::InvalidTransition { from, to });
    }
    if from == to {
        return Ok(Transition::Unchanged);
    }

    match (from, to) {
        (Creating, Running | Failed)
        | (Running, Stopped | Failed)
        | (Stopped, Running | Failed)
        | (Failed, Running) => Ok(Transition::Apply),
        _ => Err(SchedulerError::InvalidTransition { from, to }),
    }
}
