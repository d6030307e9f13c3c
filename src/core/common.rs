//! Shared capacity/allocation/usage bookkeeping embedded into hosts, clusters and the cloud.

use std::fmt;

use serde::Serialize;

pub type VmId = String;
pub type HostId = u32;
pub type ClusterId = u32;

/// Trace time units as they appear in input traces.
pub type TraceTime = u64;

pub const BYTES_PER_MB: u64 = 1024 * 1024;
pub const BYTES_PER_GB: u64 = 1024 * BYTES_PER_MB;

/// Requested or measured amount of the two simulated resources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Resources {
    pub cpu_mhz: u64,
    pub memory_mb: u64,
}

impl Resources {
    pub fn new(cpu_mhz: u64, memory_mb: u64) -> Self {
        Self { cpu_mhz, memory_mb }
    }
}

/// Capacities are fixed at construction. Allocated and used values are not kept in sync with
/// children automatically, owners recompute them once per simulation step.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ResourceAccount {
    pub id: u32,
    total_memory_bytes: u64,
    total_cpu_mhz: u64,
    pub(crate) allocated_memory_bytes: u64,
    pub(crate) allocated_cpu_mhz: u64,
    pub(crate) used_memory_bytes: u64,
    pub(crate) used_cpu_mhz: u64,
}

impl ResourceAccount {
    pub fn new(id: u32, total_cpu_mhz: u64, total_memory_bytes: u64) -> Self {
        Self {
            id,
            total_memory_bytes,
            total_cpu_mhz,
            ..Default::default()
        }
    }

    pub fn total_cpu_mhz(&self) -> u64 {
        self.total_cpu_mhz
    }

    pub fn total_memory_bytes(&self) -> u64 {
        self.total_memory_bytes
    }

    pub fn total_memory_mb(&self) -> u64 {
        self.total_memory_bytes / BYTES_PER_MB
    }

    pub fn allocated_cpu_mhz(&self) -> u64 {
        self.allocated_cpu_mhz
    }

    pub fn allocated_memory_bytes(&self) -> u64 {
        self.allocated_memory_bytes
    }

    pub fn allocated_memory_mb(&self) -> u64 {
        self.allocated_memory_bytes / BYTES_PER_MB
    }

    pub fn used_cpu_mhz(&self) -> u64 {
        self.used_cpu_mhz
    }

    pub fn used_memory_bytes(&self) -> u64 {
        self.used_memory_bytes
    }

    pub fn available_cpu_mhz(&self) -> u64 {
        self.total_cpu_mhz.saturating_sub(self.allocated_cpu_mhz)
    }

    pub fn available_memory_mb(&self) -> u64 {
        self.total_memory_mb().saturating_sub(self.allocated_memory_mb())
    }

    pub fn allocated_cpu_percent(&self) -> f64 {
        percent(self.allocated_cpu_mhz, self.total_cpu_mhz)
    }

    pub fn allocated_memory_percent(&self) -> f64 {
        percent(self.allocated_memory_bytes, self.total_memory_bytes)
    }

    pub fn used_cpu_percent(&self) -> f64 {
        percent(self.used_cpu_mhz, self.total_cpu_mhz)
    }

    pub fn used_memory_percent(&self) -> f64 {
        percent(self.used_memory_bytes, self.total_memory_bytes)
    }

    /// Checks the two-dimensional fit of `request` against unallocated capacity.
    pub fn can_fit(&self, request: &Resources) -> bool {
        request.cpu_mhz <= self.available_cpu_mhz()
            && request.memory_mb <= self.available_memory_mb()
    }

    pub(crate) fn reset_allocation(&mut self) {
        self.allocated_cpu_mhz = 0;
        self.allocated_memory_bytes = 0;
    }

    pub(crate) fn reset_usage(&mut self) {
        self.used_cpu_mhz = 0;
        self.used_memory_bytes = 0;
    }

    pub(crate) fn add_allocation_of(&mut self, other: &ResourceAccount) {
        self.allocated_cpu_mhz += other.allocated_cpu_mhz;
        self.allocated_memory_bytes += other.allocated_memory_bytes;
    }

    pub(crate) fn add_usage_of(&mut self, other: &ResourceAccount) {
        self.used_cpu_mhz += other.used_cpu_mhz;
        self.used_memory_bytes += other.used_memory_bytes;
    }
}

impl fmt::Display for ResourceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id [{}], total memory [{}MB], total cpu [{}Mhz], allocated memory [{}MB], \
             allocated cpu [{}Mhz], allocated memory in % [{:.2}], allocated cpu in % [{:.2}], \
             memory used [{}Mb], cpu used [{}Mhz], used memory in % [{:.2}], used cpu in % [{:.2}]",
            self.id,
            self.total_memory_mb(),
            self.total_cpu_mhz,
            self.allocated_memory_mb(),
            self.allocated_cpu_mhz,
            self.allocated_memory_percent(),
            self.allocated_cpu_percent(),
            self.used_memory_bytes / BYTES_PER_MB,
            self.used_cpu_mhz,
            self.used_memory_percent(),
            self.used_cpu_percent()
        )
    }
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

/// Capability of entities which sum their children's accounts.
pub trait Aggregate {
    fn recompute_allocation(&mut self);
    fn recompute_usage(&mut self);
}
