//! Database models for hosts, containers and container services.

pub mod common;
pub mod container;
pub mod container_service;
pub mod host;

pub use common::*;
pub use container::*;
pub use container_service::*;
pub use host::*;
