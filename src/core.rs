//! Fleet data model, lifecycle transitions and the policy interfaces.

pub mod cloud;
pub mod cluster;
pub mod common;
pub mod demand;
pub mod error;
pub mod host;
pub mod placement;
pub mod rebalancing;
pub mod vm;
