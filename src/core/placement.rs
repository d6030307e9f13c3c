//! Placement policies decide where a new virtual machine lands.

use crate::core::cluster::Cluster;
use crate::core::common::HostId;
use crate::core::error::SimulationError;
use crate::core::host::Host;
use crate::core::vm::VirtualMachine;

/// Trait which should implement any placement policy.
///
/// Both methods reorder the given references, most preferred first, and must not change the
/// entities. The engine walks ranked clusters, then ranked hosts of each cluster, and takes the
/// first host with enough unallocated capacity.
pub trait PlacementPolicy {
    fn rank_clusters<'a>(
        &self,
        clusters: Vec<&'a Cluster>,
        vm: &VirtualMachine,
    ) -> Vec<&'a Cluster>;

    fn rank_hosts<'a>(&self, hosts: Vec<&'a Host>, vm: &VirtualMachine) -> Vec<&'a Host>;
}

pub fn placement_policy_resolver(name: &str) -> Result<Box<dyn PlacementPolicy>, SimulationError> {
    match name {
        "SmallestClusterFirst" => Ok(Box::new(SmallestClusterFirst {})),
        "LeastAllocatedHost" => Ok(Box::new(LeastAllocatedHost {})),
        _ => Err(SimulationError::Config(format!(
            "unsupported placement policy: {:?}",
            name
        ))),
    }
}

/// First-fit walk over the ranked candidates. No backtracking once a host is found.
pub fn select_host(
    policy: &dyn PlacementPolicy,
    clusters: &[Cluster],
    vm: &VirtualMachine,
) -> Option<HostId> {
    let requested = vm.requested();
    for cluster in policy.rank_clusters(clusters.iter().collect(), vm) {
        for host in policy.rank_hosts(cluster.hosts().iter().collect(), vm) {
            if host.can_fit(&requested) {
                return Some(host.id());
            }
        }
    }
    None
}

////////////////////////////////////////////////////////////////////////////////

/// Spreads load: clusters with fewer hosted VMs come first, hosts keep topology order.
pub struct SmallestClusterFirst {}

impl PlacementPolicy for SmallestClusterFirst {
    fn rank_clusters<'a>(
        &self,
        mut clusters: Vec<&'a Cluster>,
        _vm: &VirtualMachine,
    ) -> Vec<&'a Cluster> {
        // stable, ties keep topology order
        clusters.sort_by_key(|cluster| cluster.vm_count());
        clusters
    }

    fn rank_hosts<'a>(&self, hosts: Vec<&'a Host>, _vm: &VirtualMachine) -> Vec<&'a Host> {
        hosts
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Clusters as in `SmallestClusterFirst`. Hosts with the highest share of free capacity after
/// placing the VM come first, CPU and memory weighted equally.
pub struct LeastAllocatedHost {}

impl LeastAllocatedHost {
    fn score(host: &Host, vm: &VirtualMachine) -> f64 {
        let requested = vm.requested();
        let account = &host.account;
        let free_share = |available: u64, requested: u64, total: u64| {
            if total == 0 {
                return 0.0;
            }
            (available as f64 - requested as f64) * 100.0 / total as f64
        };
        let cpu_score = free_share(
            account.available_cpu_mhz(),
            requested.cpu_mhz,
            account.total_cpu_mhz(),
        );
        let memory_score = free_share(
            account.available_memory_mb(),
            requested.memory_mb,
            account.total_memory_mb(),
        );
        (cpu_score + memory_score) / 2.0
    }
}

impl PlacementPolicy for LeastAllocatedHost {
    fn rank_clusters<'a>(
        &self,
        clusters: Vec<&'a Cluster>,
        vm: &VirtualMachine,
    ) -> Vec<&'a Cluster> {
        SmallestClusterFirst {}.rank_clusters(clusters, vm)
    }

    fn rank_hosts<'a>(&self, mut hosts: Vec<&'a Host>, vm: &VirtualMachine) -> Vec<&'a Host> {
        hosts.sort_by(|a, b| Self::score(b, vm).total_cmp(&Self::score(a, vm)));
        hosts
    }
}
