//! Root of the fleet hierarchy. Owns every cluster and the registry of all virtual machines.
//!
//! Virtual machines reference their host by id and hosts keep VM ids, so the cloud is the only
//! owner of the whole graph. Every lifecycle transition (deploy, destroy, migrate) is a single
//! method taking `&mut self`, which means no reader can observe a VM registered in the deployed
//! set while missing from its host allocation, or the other way around.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;

use crate::core::cluster::Cluster;
use crate::core::common::{Aggregate, HostId, ResourceAccount, VmId};
use crate::core::error::SimulationError;
use crate::core::host::Host;
use crate::core::vm::{VirtualMachine, VmState};

pub struct Cloud {
    pub account: ResourceAccount,
    clusters: Vec<Cluster>,
    // host id -> index of its cluster
    host_index: HashMap<HostId, usize>,
    vms: BTreeMap<VmId, VirtualMachine>,
    deployed: BTreeSet<VmId>,
}

impl Cloud {
    pub fn new(clusters: Vec<Cluster>) -> Result<Self, SimulationError> {
        let mut host_index: HashMap<HostId, usize> = Default::default();
        for (idx, cluster) in clusters.iter().enumerate() {
            for host in cluster.hosts() {
                if host_index.insert(host.id(), idx).is_some() {
                    return Err(SimulationError::Config(format!(
                        "duplicate host id {}",
                        host.id()
                    )));
                }
            }
        }
        let total_cpu = clusters.iter().map(|c| c.account.total_cpu_mhz()).sum();
        let total_memory = clusters.iter().map(|c| c.account.total_memory_bytes()).sum();
        Ok(Self {
            account: ResourceAccount::new(0, total_cpu, total_memory),
            clusters,
            host_index,
            vms: Default::default(),
            deployed: Default::default(),
        })
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn host_count(&self) -> usize {
        self.host_index.len()
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        let cluster_idx = *self.host_index.get(&id)?;
        self.clusters[cluster_idx].host(id)
    }

    /// Index of the cluster the host belongs to.
    pub fn cluster_index_of(&self, host_id: HostId) -> Option<usize> {
        self.host_index.get(&host_id).copied()
    }

    pub fn register_vm(&mut self, vm: VirtualMachine) -> Result<(), SimulationError> {
        if self.vms.contains_key(&vm.id) {
            return Err(SimulationError::Config(format!(
                "vm {:?} is registered twice",
                vm.id
            )));
        }
        self.vms.insert(vm.id.clone(), vm);
        Ok(())
    }

    pub fn vm(&self, id: &str) -> Option<&VirtualMachine> {
        self.vms.get(id)
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    pub fn deployed_vms(&self) -> &BTreeSet<VmId> {
        &self.deployed
    }

    fn expect_vm(&self, id: &str) -> &VirtualMachine {
        self.vms
            .get(id)
            .unwrap_or_else(|| panic!("vm {:?} is not registered in cloud", id))
    }

    fn expect_host_mut(&mut self, id: HostId) -> &mut Host {
        let cluster_idx = *self
            .host_index
            .get(&id)
            .unwrap_or_else(|| panic!("host {} does not exist", id));
        self.clusters[cluster_idx]
            .host_mut(id)
            .unwrap_or_else(|| panic!("host {} does not exist", id))
    }

    /// Places a pending VM on `host_id`. Fails without touching any state if it does not fit.
    pub fn deploy(&mut self, vm_id: &str, host_id: HostId) -> Result<(), SimulationError> {
        let vm = self.expect_vm(vm_id);
        if vm.state() != VmState::Pending {
            panic!("vm {:?} cannot be deployed from state {:?}", vm_id, vm.state());
        }
        let requested = vm.requested();
        let fits = self
            .host(host_id)
            .map(|host| host.can_fit(&requested))
            .unwrap_or(false);
        if !fits {
            return Err(SimulationError::CapacityExhausted {
                vm_id: vm_id.to_string(),
                requested_cpu_mhz: requested.cpu_mhz,
                requested_memory_mb: requested.memory_mb,
            });
        }

        let vm = self.vms.get_mut(vm_id).unwrap_or_else(|| unreachable!());
        vm.set_deployed(host_id);
        let cluster_idx = self.host_index[&host_id];
        if let Some(host) = self.clusters[cluster_idx].host_mut(host_id) {
            host.add_vm(vm);
        }
        self.deployed.insert(vm_id.to_string());
        debug!("Deployed vm {:?} on host {}", vm_id, host_id);
        Ok(())
    }

    /// Removes a deployed VM from its host and from the deployed set. Returns false for VMs which
    /// are not deployed.
    pub fn destroy(&mut self, vm_id: &str) -> bool {
        if !self.deployed.remove(vm_id) {
            return false;
        }
        let host_id = match self.expect_vm(vm_id).host() {
            Some(host_id) => host_id,
            None => panic!("deployed vm {:?} has no host", vm_id),
        };
        self.expect_host_mut(host_id).remove_vm(vm_id);
        if let Some(vm) = self.vms.get_mut(vm_id) {
            vm.set_destroyed();
        }
        debug!("Destroyed vm {:?} on host {}", vm_id, host_id);
        true
    }

    /// Destroys every deployed VM whose destroy time is strictly before `time`.
    pub fn destroy_expired(&mut self, time: f64) -> Vec<VmId> {
        let expired: Vec<VmId> = self
            .deployed
            .iter()
            .filter(|id| (self.expect_vm(id).destroy_time as f64) < time)
            .cloned()
            .collect();
        for vm_id in expired.iter() {
            self.destroy(vm_id);
        }
        expired
    }

    /// Moves a deployed VM to `target`. Returns `Ok(false)` when the target is the current host.
    pub fn migrate(&mut self, vm_id: &str, target: HostId) -> Result<bool, SimulationError> {
        let violation = |reason: String| SimulationError::PolicyViolation {
            vm_id: vm_id.to_string(),
            reason,
        };
        let vm = self
            .vms
            .get(vm_id)
            .ok_or_else(|| violation("vm is unknown".to_string()))?;
        let source = match (vm.state(), vm.host()) {
            (VmState::Deployed, Some(source)) => source,
            _ => return Err(violation("vm is not deployed".to_string())),
        };
        if source == target {
            return Ok(false);
        }
        let requested = vm.requested();
        let target_host = self
            .host(target)
            .ok_or_else(|| violation(format!("target host {} does not exist", target)))?;
        if !target_host.can_fit(&requested) {
            return Err(violation(format!(
                "target host {} has [{}Mhz, {}MB] available, vm requests [{}Mhz, {}MB]",
                target,
                target_host.account.available_cpu_mhz(),
                target_host.account.available_memory_mb(),
                requested.cpu_mhz,
                requested.memory_mb
            )));
        }

        let usage = self.expect_host_mut(source).remove_vm(vm_id).map(|p| p.usage);
        let vm = self.vms.get_mut(vm_id).unwrap_or_else(|| unreachable!());
        vm.set_host(target);
        let cluster_idx = self.host_index[&target];
        if let Some(host) = self.clusters[cluster_idx].host_mut(target) {
            host.add_vm(vm);
            if let Some(usage) = usage {
                host.set_vm_usage(vm_id, usage);
            }
        }
        debug!("Migrated vm {:?} from host {} to host {}", vm_id, source, target);
        Ok(true)
    }

    /// Evaluates demand of every deployed VM at `time` and aggregates usage bottom-up.
    pub fn update_usage(&mut self, time: f64) {
        for vm_id in self.deployed.iter() {
            let vm = &self.vms[vm_id];
            let host_id = match vm.host() {
                Some(host_id) => host_id,
                None => panic!("deployed vm {:?} has no host", vm_id),
            };
            let usage = vm.usage_at(time);
            let cluster_idx = self.host_index[&host_id];
            if let Some(host) = self.clusters[cluster_idx].host_mut(host_id) {
                host.set_vm_usage(vm_id, usage);
            }
        }
        self.recompute_usage();
    }

    /// Recomputes one cluster and re-sums the cloud from cluster accounts.
    pub fn recompute_cluster(&mut self, cluster_idx: usize) {
        let cluster = &mut self.clusters[cluster_idx];
        cluster.recompute_allocation();
        cluster.recompute_usage();
        self.sum_clusters();
    }

    fn sum_clusters(&mut self) {
        self.account.reset_allocation();
        self.account.reset_usage();
        for cluster in self.clusters.iter() {
            self.account.add_allocation_of(&cluster.account);
            self.account.add_usage_of(&cluster.account);
        }
    }
}

impl Aggregate for Cloud {
    fn recompute_allocation(&mut self) {
        self.account.reset_allocation();
        for cluster in self.clusters.iter_mut() {
            cluster.recompute_allocation();
            self.account.add_allocation_of(&cluster.account);
        }
    }

    fn recompute_usage(&mut self) {
        self.account.reset_usage();
        for cluster in self.clusters.iter_mut() {
            cluster.recompute_usage();
            self.account.add_usage_of(&cluster.account);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cloud;
    use crate::core::cluster::Cluster;
    use crate::core::common::Aggregate;
    use crate::core::error::SimulationError;
    use crate::core::host::HostSpec;
    use crate::core::vm::VmState;
    use crate::test_util::helpers::make_vm;

    fn cloud() -> Cloud {
        let spec = HostSpec {
            number_of_cores: 10,
            core_speed_mhz: 1000,
            memory_mb: 10240,
        };
        Cloud::new(vec![Cluster::new(0, 0, 2, &spec), Cluster::new(1, 2, 2, &spec)]).unwrap()
    }

    #[test]
    fn test_duplicate_host_ids_are_rejected() {
        let spec = HostSpec::default();
        let result = Cloud::new(vec![Cluster::new(0, 0, 2, &spec), Cluster::new(1, 1, 2, &spec)]);
        assert!(matches!(result, Err(SimulationError::Config(_))));
    }

    #[test]
    fn test_duplicate_vm_ids_are_rejected() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("vm", 1, 1000, 512, 0, 10)).unwrap();
        assert_eq!(
            Err(SimulationError::Config("vm \"vm\" is registered twice".to_string())),
            cloud.register_vm(make_vm("vm", 2, 1000, 512, 0, 10))
        );
        assert_eq!(1, cloud.vm("vm").unwrap().offering.number_of_cores);
    }

    #[test]
    fn test_deploy_registers_vm_with_host_and_cloud() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("vm", 4, 1000, 2048, 0, 10)).unwrap();
        cloud.deploy("vm", 3).unwrap();

        assert_eq!(Some(3), cloud.vm("vm").unwrap().host());
        assert!(cloud.host(3).unwrap().has_vm("vm"));
        assert!(cloud.deployed_vms().contains("vm"));
        assert_eq!(4000, cloud.host(3).unwrap().account.allocated_cpu_mhz());
    }

    #[test]
    fn test_deploy_without_room_does_not_mutate_state() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("big", 11, 1000, 1, 0, 10)).unwrap();
        assert_eq!(
            Err(SimulationError::CapacityExhausted {
                vm_id: "big".to_string(),
                requested_cpu_mhz: 11000,
                requested_memory_mb: 1,
            }),
            cloud.deploy("big", 0)
        );
        assert_eq!(None, cloud.vm("big").unwrap().host());
        assert_eq!(VmState::Pending, cloud.vm("big").unwrap().state());
        assert_eq!(0, cloud.host(0).unwrap().vm_count());
        assert!(cloud.deployed_vms().is_empty());
    }

    #[test]
    fn test_destroy_expired_uses_strict_comparison() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("vm", 1, 1000, 1024, 0, 100)).unwrap();
        cloud.deploy("vm", 0).unwrap();

        assert!(cloud.destroy_expired(100.0).is_empty());
        assert_eq!(vec!["vm".to_string()], cloud.destroy_expired(101.0));
        assert_eq!(None, cloud.vm("vm").unwrap().host());
        assert_eq!(VmState::Destroyed, cloud.vm("vm").unwrap().state());
        assert_eq!(0, cloud.host(0).unwrap().account.allocated_cpu_mhz());
        assert!(!cloud.destroy("vm"));
    }

    #[test]
    fn test_migration_to_full_host_is_rejected() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("a", 6, 1000, 1024, 0, 10)).unwrap();
        cloud.register_vm(make_vm("b", 6, 1000, 1024, 0, 10)).unwrap();
        cloud.deploy("a", 0).unwrap();
        cloud.deploy("b", 1).unwrap();

        assert!(matches!(
            cloud.migrate("a", 1),
            Err(SimulationError::PolicyViolation { .. })
        ));
        assert_eq!(Some(0), cloud.vm("a").unwrap().host());
        assert_eq!(Ok(false), cloud.migrate("a", 0));
    }

    #[test]
    fn test_reaggregation_is_idempotent() {
        let mut cloud = cloud();
        cloud.register_vm(make_vm("a", 3, 1000, 1024, 0, 10)).unwrap();
        cloud.register_vm(make_vm("b", 2, 1000, 2048, 0, 10)).unwrap();
        cloud.deploy("a", 0).unwrap();
        cloud.deploy("b", 2).unwrap();

        cloud.recompute_allocation();
        cloud.update_usage(0.0);
        let first = cloud.account.clone();
        cloud.recompute_allocation();
        cloud.update_usage(0.0);
        assert_eq!(first, cloud.account);
        assert_eq!(5000, cloud.account.allocated_cpu_mhz());
        assert_eq!(3072, cloud.account.allocated_memory_mb());
    }
}
