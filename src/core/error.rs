//! Fatal conditions which halt a simulation run.

use thiserror::Error;

use crate::core::common::VmId;

#[derive(Error, Debug, PartialEq)]
pub enum SimulationError {
    /// No cluster/host combination can host the VM. The fleet is undersized for the trace.
    #[error("capacity exhausted: vm [{vm_id}] requesting [{requested_cpu_mhz}Mhz, {requested_memory_mb}MB] fits no host")]
    CapacityExhausted {
        vm_id: VmId,
        requested_cpu_mhz: u64,
        requested_memory_mb: u64,
    },

    #[error("malformed input at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("cannot read file {path}: {reason}")]
    MissingFile { path: String, reason: String },

    #[error("rebalancing policy proposed invalid migration of vm [{vm_id}]: {reason}")]
    PolicyViolation { vm_id: VmId, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl SimulationError {
    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        SimulationError::MalformedInput {
            line,
            reason: reason.into(),
        }
    }
}
