//! Load imbalance of a cluster measured as the population standard deviation of per-host values.

use std::fmt;

use average::{Estimate, Variance};

use crate::core::cluster::Cluster;
use crate::core::common::BYTES_PER_GB;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClusterDispersion {
    pub memory_allocated_gib: f64,
    pub memory_used_gib: f64,
    pub cpu_allocated_ghz: f64,
    pub cpu_used_ghz: f64,
}

/// Population (not sample) standard deviation. Zero for less than two values.
pub fn population_std(values: impl Iterator<Item = f64>) -> f64 {
    let mut variance = Variance::new();
    for value in values {
        variance.add(value);
    }
    if variance.len() < 2 {
        return 0.0;
    }
    variance.population_variance().sqrt()
}

impl ClusterDispersion {
    pub fn of(cluster: &Cluster) -> Self {
        let hosts = cluster.hosts();
        let gib = |bytes: u64| bytes as f64 / BYTES_PER_GB as f64;
        let ghz = |mhz: u64| mhz as f64 / 1000.0;
        Self {
            memory_allocated_gib: population_std(
                hosts.iter().map(|h| gib(h.account.allocated_memory_bytes())),
            ),
            memory_used_gib: population_std(
                hosts.iter().map(|h| gib(h.account.used_memory_bytes())),
            ),
            cpu_allocated_ghz: population_std(
                hosts.iter().map(|h| ghz(h.account.allocated_cpu_mhz())),
            ),
            cpu_used_ghz: population_std(hosts.iter().map(|h| ghz(h.account.used_cpu_mhz()))),
        }
    }
}

// Tokens are matched verbatim by log post-processing.
impl fmt::Display for ClusterDispersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory STD [{:.2}Gib], memory usage STD [{:.2}Gib], cpu STD [{:.2}Ghz], \
             cpu usage STD [{:.2}Ghz]",
            self.memory_allocated_gib,
            self.memory_used_gib,
            self.cpu_allocated_ghz,
            self.cpu_used_ghz
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::common::Aggregate;
    use crate::core::host::HostSpec;
    use crate::test_util::helpers::make_vm;

    #[test]
    fn test_population_std_is_not_sample_std() {
        // sample std of these values would be sqrt(32/7)
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(values.into_iter()) - 2.0).abs() < 1e-12);
        assert_eq!(0.0, population_std([3.0].into_iter()));
        assert_eq!(0.0, population_std(std::iter::empty()));
    }

    #[test]
    fn test_cluster_dispersion_of_memory_allocation() {
        let spec = HostSpec {
            number_of_cores: 8,
            core_speed_mhz: 1000,
            memory_mb: 16384,
        };
        let mut cluster = Cluster::new(0, 0, 2, &spec);
        cluster.host_mut(0).unwrap().add_vm(&make_vm("a", 2, 1000, 4096, 0, 1));
        cluster.recompute_allocation();

        let dispersion = ClusterDispersion::of(&cluster);
        assert!((dispersion.memory_allocated_gib - 2.0).abs() < 1e-12);
        assert!((dispersion.cpu_allocated_ghz - 1.0).abs() < 1e-12);
        assert_eq!(0.0, dispersion.cpu_used_ghz);
        assert_eq!(
            "memory STD [2.00Gib], memory usage STD [0.00Gib], cpu STD [1.00Ghz], \
             cpu usage STD [0.00Ghz]",
            dispersion.to_string()
        );
    }
}
