//! Leaf of the fleet hierarchy which runs virtual machines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::common::{
    Aggregate, ClusterId, HostId, ResourceAccount, Resources, VmId, BYTES_PER_MB,
};
use crate::core::vm::VirtualMachine;

/// Hardware description a group of identical hosts is built from.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct HostSpec {
    pub number_of_cores: u64,
    pub core_speed_mhz: u64,
    pub memory_mb: u64,
}

/// What a host knows about a VM placed on it.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlacedVm {
    pub requested: Resources,
    /// Usage computed at the last usage recomputation.
    pub usage: Resources,
}

#[derive(Clone, Debug)]
pub struct Host {
    pub account: ResourceAccount,
    pub cluster_id: ClusterId,
    vms: BTreeMap<VmId, PlacedVm>,
}

impl Host {
    pub fn new(id: HostId, cluster_id: ClusterId, spec: &HostSpec) -> Self {
        Self {
            account: ResourceAccount::new(
                id,
                spec.number_of_cores * spec.core_speed_mhz,
                spec.memory_mb * BYTES_PER_MB,
            ),
            cluster_id,
            vms: Default::default(),
        }
    }

    pub fn id(&self) -> HostId {
        self.account.id
    }

    pub fn vms(&self) -> &BTreeMap<VmId, PlacedVm> {
        &self.vms
    }

    pub fn vm_count(&self) -> usize {
        self.vms.len()
    }

    pub fn has_vm(&self, vm_id: &str) -> bool {
        self.vms.contains_key(vm_id)
    }

    pub fn can_fit(&self, request: &Resources) -> bool {
        self.account.can_fit(request)
    }

    /// Registers the VM and charges its requested capacity. Capacity is checked by callers.
    pub fn add_vm(&mut self, vm: &VirtualMachine) {
        let requested = vm.requested();
        let previous = self.vms.insert(
            vm.id.clone(),
            PlacedVm {
                requested,
                usage: Resources::default(),
            },
        );
        if previous.is_some() {
            panic!("vm {:?} is already placed on host {}", vm.id, self.id());
        }
        self.account.allocated_cpu_mhz += requested.cpu_mhz;
        self.account.allocated_memory_bytes += requested.memory_mb * BYTES_PER_MB;
    }

    pub fn remove_vm(&mut self, vm_id: &str) -> Option<PlacedVm> {
        let placed = self.vms.remove(vm_id)?;
        self.account.allocated_cpu_mhz -= placed.requested.cpu_mhz;
        self.account.allocated_memory_bytes -= placed.requested.memory_mb * BYTES_PER_MB;
        self.account.used_cpu_mhz = self.account.used_cpu_mhz.saturating_sub(placed.usage.cpu_mhz);
        self.account.used_memory_bytes = self
            .account
            .used_memory_bytes
            .saturating_sub(placed.usage.memory_mb * BYTES_PER_MB);
        Some(placed)
    }

    pub(crate) fn set_vm_usage(&mut self, vm_id: &str, usage: Resources) {
        match self.vms.get_mut(vm_id) {
            Some(placed) => placed.usage = usage,
            None => panic!("vm {:?} is not placed on host {}", vm_id, self.id()),
        }
    }
}

impl Aggregate for Host {
    fn recompute_allocation(&mut self) {
        self.account.reset_allocation();
        for placed in self.vms.values() {
            self.account.allocated_cpu_mhz += placed.requested.cpu_mhz;
            self.account.allocated_memory_bytes += placed.requested.memory_mb * BYTES_PER_MB;
        }
    }

    fn recompute_usage(&mut self) {
        self.account.reset_usage();
        for placed in self.vms.values() {
            self.account.used_cpu_mhz += placed.usage.cpu_mhz;
            self.account.used_memory_bytes += placed.usage.memory_mb * BYTES_PER_MB;
        }
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Host {}
