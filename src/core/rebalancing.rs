//! Rebalancing (cluster administration) policies which propose live migrations.

use std::collections::{BTreeMap, HashSet};

use log::debug;

use crate::core::common::{HostId, Resources, VmId};
use crate::core::error::SimulationError;
use crate::core::host::Host;

/// Ordered mapping of VM to the host it should move to.
pub type MigrationPlan = BTreeMap<VmId, HostId>;

/// Trait which should implement any rebalancing policy. Called once per cluster per step with
/// the hosts of that cluster.
///
/// The engine validates each proposed migration and treats an infeasible one as fatal, so a
/// policy must account for capacity taken by the migrations it has already proposed.
pub trait RebalancingPolicy {
    fn rank_hosts<'a>(&self, hosts: Vec<&'a Host>) -> Vec<&'a Host>;

    fn map_vms_to_target_host(&self, ranked_hosts: &[&Host]) -> MigrationPlan;
}

pub fn rebalancing_policy_resolver(
    name: &str,
    max_migrations: usize,
) -> Result<Box<dyn RebalancingPolicy>, SimulationError> {
    match name {
        "NoOp" => Ok(Box::new(NoOpRebalancing {})),
        "GreedyAllocationBalancer" => Ok(Box::new(GreedyAllocationBalancer::new(max_migrations))),
        _ => Err(SimulationError::Config(format!(
            "unsupported rebalancing policy: {:?}",
            name
        ))),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Keeps the cluster as is.
pub struct NoOpRebalancing {}

impl RebalancingPolicy for NoOpRebalancing {
    fn rank_hosts<'a>(&self, hosts: Vec<&'a Host>) -> Vec<&'a Host> {
        hosts
    }

    fn map_vms_to_target_host(&self, _ranked_hosts: &[&Host]) -> MigrationPlan {
        MigrationPlan::new()
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Moves the smallest VMs from the host with the most allocated memory to the host with the
/// least, while each move narrows the gap between the two. A host is either a source or a target
/// within one plan, so migrations can be executed in any order.
pub struct GreedyAllocationBalancer {
    max_migrations: usize,
}

struct HostState {
    id: HostId,
    allocated: Resources,
    total: Resources,
    // sorted by requested memory, smallest first
    vms: Vec<(VmId, Resources)>,
}

impl HostState {
    fn from_host(host: &Host) -> Self {
        let mut vms: Vec<(VmId, Resources)> = host
            .vms()
            .iter()
            .map(|(id, placed)| (id.clone(), placed.requested))
            .collect();
        vms.sort_by_key(|(_, requested)| requested.memory_mb);
        Self {
            id: host.id(),
            allocated: Resources::new(
                host.account.allocated_cpu_mhz(),
                host.account.allocated_memory_mb(),
            ),
            total: Resources::new(host.account.total_cpu_mhz(), host.account.total_memory_mb()),
            vms,
        }
    }

    fn fits(&self, request: &Resources) -> bool {
        self.allocated.cpu_mhz + request.cpu_mhz <= self.total.cpu_mhz
            && self.allocated.memory_mb + request.memory_mb <= self.total.memory_mb
    }
}

impl GreedyAllocationBalancer {
    pub fn new(max_migrations: usize) -> Self {
        Self { max_migrations }
    }
}

impl RebalancingPolicy for GreedyAllocationBalancer {
    fn rank_hosts<'a>(&self, mut hosts: Vec<&'a Host>) -> Vec<&'a Host> {
        hosts.sort_by(|a, b| {
            b.account
                .allocated_memory_bytes()
                .cmp(&a.account.allocated_memory_bytes())
                .then(b.account.allocated_cpu_mhz().cmp(&a.account.allocated_cpu_mhz()))
        });
        hosts
    }

    fn map_vms_to_target_host(&self, ranked_hosts: &[&Host]) -> MigrationPlan {
        let mut plan = MigrationPlan::new();
        let mut states: Vec<HostState> =
            ranked_hosts.iter().map(|h| HostState::from_host(h)).collect();
        let mut sources: HashSet<usize> = Default::default();
        let mut targets: HashSet<usize> = Default::default();

        while plan.len() < self.max_migrations {
            // ties resolve to the earliest ranked host
            let source = states
                .iter()
                .enumerate()
                .filter(|(idx, _)| !targets.contains(idx))
                .fold(None, |best: Option<(usize, u64)>, (idx, state)| match best {
                    Some((_, memory)) if memory >= state.allocated.memory_mb => best,
                    _ => Some((idx, state.allocated.memory_mb)),
                });
            let Some((source, source_memory)) = source else {
                break;
            };
            let target = states
                .iter()
                .enumerate()
                .filter(|(idx, _)| *idx != source && !sources.contains(idx))
                .fold(None, |best: Option<(usize, u64)>, (idx, state)| match best {
                    Some((_, memory)) if memory <= state.allocated.memory_mb => best,
                    _ => Some((idx, state.allocated.memory_mb)),
                });
            let Some((target, target_memory)) = target else {
                break;
            };
            if source_memory <= target_memory {
                break;
            }
            let gap = source_memory - target_memory;

            let candidate = states[source].vms.iter().position(|(_, requested)| {
                requested.memory_mb > 0
                    && requested.memory_mb < gap
                    && states[target].fits(requested)
            });
            let Some(vm_idx) = candidate else {
                break;
            };

            let (vm_id, requested) = states[source].vms.remove(vm_idx);
            states[source].allocated.cpu_mhz -= requested.cpu_mhz;
            states[source].allocated.memory_mb -= requested.memory_mb;
            states[target].allocated.cpu_mhz += requested.cpu_mhz;
            states[target].allocated.memory_mb += requested.memory_mb;
            sources.insert(source);
            targets.insert(target);

            debug!(
                "Plan to migrate vm {:?} from host {} to host {}",
                vm_id, states[source].id, states[target].id
            );
            plan.insert(vm_id, states[target].id);
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::HostSpec;
    use crate::test_util::helpers::make_vm;

    fn host(id: HostId) -> Host {
        Host::new(
            id,
            0,
            &HostSpec {
                number_of_cores: 16,
                core_speed_mhz: 1000,
                memory_mb: 16384,
            },
        )
    }

    #[test]
    fn test_noop_keeps_order_and_plans_nothing() {
        let hosts = vec![host(2), host(0), host(1)];
        let policy = NoOpRebalancing {};
        let ranked = policy.rank_hosts(hosts.iter().collect());
        assert_eq!(vec![2, 0, 1], ranked.iter().map(|h| h.id()).collect::<Vec<_>>());
        assert!(policy.map_vms_to_target_host(&ranked).is_empty());
    }

    #[test]
    fn test_greedy_moves_small_vms_towards_empty_host() {
        let mut loaded = host(0);
        loaded.add_vm(&make_vm("big", 4, 1000, 8192, 0, 1));
        loaded.add_vm(&make_vm("small", 1, 1000, 2048, 0, 1));
        loaded.add_vm(&make_vm("medium", 2, 1000, 4096, 0, 1));
        let empty = host(1);
        let hosts = vec![empty, loaded];

        let policy = GreedyAllocationBalancer::new(10);
        let ranked = policy.rank_hosts(hosts.iter().collect());
        assert_eq!(vec![0, 1], ranked.iter().map(|h| h.id()).collect::<Vec<_>>());

        // 14336 vs 0: small narrows the gap to 10240, then medium to 2048
        let plan = policy.map_vms_to_target_host(&ranked);
        assert_eq!(
            MigrationPlan::from([("medium".to_string(), 1), ("small".to_string(), 1)]),
            plan
        );
    }

    #[test]
    fn test_greedy_respects_migration_limit() {
        let mut loaded = host(0);
        for idx in 0..4 {
            loaded.add_vm(&make_vm(&format!("vm_{}", idx), 1, 1000, 1024, 0, 1));
        }
        let hosts = vec![loaded, host(1)];
        let policy = GreedyAllocationBalancer::new(1);
        let ranked = policy.rank_hosts(hosts.iter().collect());
        assert_eq!(1, policy.map_vms_to_target_host(&ranked).len());
    }

    #[test]
    fn test_greedy_leaves_balanced_hosts_alone() {
        let mut first = host(0);
        let mut second = host(1);
        first.add_vm(&make_vm("a", 1, 1000, 4096, 0, 1));
        second.add_vm(&make_vm("b", 1, 1000, 4096, 0, 1));
        let hosts = vec![first, second];
        let policy = GreedyAllocationBalancer::new(10);
        let ranked = policy.rank_hosts(hosts.iter().collect());
        assert!(policy.map_vms_to_target_host(&ranked).is_empty());
    }
}
