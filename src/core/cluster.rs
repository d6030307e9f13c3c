//! Fixed ordered group of hosts.

use crate::core::common::{Aggregate, ClusterId, HostId, ResourceAccount};
use crate::core::host::{Host, HostSpec};

#[derive(Clone, Debug)]
pub struct Cluster {
    pub account: ResourceAccount,
    hosts: Vec<Host>,
}

impl Cluster {
    /// Builds `host_count` identical hosts with ids starting from `first_host_id`.
    pub fn new(id: ClusterId, first_host_id: HostId, host_count: u32, spec: &HostSpec) -> Self {
        let hosts: Vec<Host> = (0..host_count)
            .map(|idx| Host::new(first_host_id + idx, id, spec))
            .collect();
        Self::from_hosts(id, hosts)
    }

    pub fn from_hosts(id: ClusterId, hosts: Vec<Host>) -> Self {
        let total_cpu = hosts.iter().map(|h| h.account.total_cpu_mhz()).sum();
        let total_memory = hosts.iter().map(|h| h.account.total_memory_bytes()).sum();
        Self {
            account: ResourceAccount::new(id, total_cpu, total_memory),
            hosts,
        }
    }

    pub fn id(&self) -> ClusterId {
        self.account.id
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, id: HostId) -> Option<&Host> {
        self.hosts.iter().find(|h| h.id() == id)
    }

    pub(crate) fn host_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.hosts.iter_mut().find(|h| h.id() == id)
    }

    pub fn vm_count(&self) -> usize {
        self.hosts.iter().map(|h| h.vm_count()).sum()
    }
}

impl Aggregate for Cluster {
    fn recompute_allocation(&mut self) {
        self.account.reset_allocation();
        for host in self.hosts.iter_mut() {
            host.recompute_allocation();
            self.account.add_allocation_of(&host.account);
        }
    }

    fn recompute_usage(&mut self) {
        self.account.reset_usage();
        for host in self.hosts.iter_mut() {
            host.recompute_usage();
            self.account.add_usage_of(&host.account);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Cluster;
    use crate::core::common::{Aggregate, BYTES_PER_MB};
    use crate::core::host::HostSpec;
    use crate::test_util::helpers::make_vm;

    #[test]
    fn test_cluster_totals_are_sum_of_hosts() {
        let spec = HostSpec {
            number_of_cores: 8,
            core_speed_mhz: 2000,
            memory_mb: 16384,
        };
        let mut cluster = Cluster::new(3, 10, 4, &spec);
        let host_ids: Vec<_> = cluster.hosts().iter().map(|h| h.id()).collect();
        assert_eq!(vec![10, 11, 12, 13], host_ids);
        assert!(cluster.hosts().iter().all(|h| h.cluster_id == 3));
        assert_eq!(4 * 16000, cluster.account.total_cpu_mhz());
        assert_eq!(4 * 16384 * BYTES_PER_MB, cluster.account.total_memory_bytes());

        cluster.host_mut(11).unwrap().add_vm(&make_vm("a", 2, 2000, 1024, 0, 10));
        cluster.host_mut(13).unwrap().add_vm(&make_vm("b", 1, 1000, 512, 0, 10));
        // stale until recomputed
        assert_eq!(0, cluster.account.allocated_cpu_mhz());

        cluster.recompute_allocation();
        assert_eq!(5000, cluster.account.allocated_cpu_mhz());
        assert_eq!(1536, cluster.account.allocated_memory_mb());
        assert_eq!(2, cluster.vm_count());
    }
}
