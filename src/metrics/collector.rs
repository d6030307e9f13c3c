//! Centralized storage for run metrics. The engine reports deployments, destructions, migrations
//! and per-step dispersion here.

use std::fmt;

use average::{concatenate, Estimate, Max, Mean, Min, Variance};

use crate::core::common::ResourceAccount;

concatenate!(
    Estimator,
    [Min, min],
    [Max, max],
    [Mean, mean],
    [Variance, population_variance]
);

pub struct EstimatorWrapper {
    estimator: Estimator,
    count: u64,
}

impl std::fmt::Debug for EstimatorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Estimator")
            .field("min", &self.min())
            .field("max", &self.max())
            .field("mean", &self.mean())
            .field("population_variance", &self.population_variance())
            .finish()
    }
}

impl Default for EstimatorWrapper {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorWrapper {
    pub fn new() -> Self {
        Self {
            estimator: Estimator::new(),
            count: 0,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.estimator.add(value);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.estimator.min()
    }

    pub fn max(&self) -> f64 {
        self.estimator.max()
    }

    pub fn mean(&self) -> f64 {
        self.estimator.mean()
    }

    pub fn population_variance(&self) -> f64 {
        self.estimator.population_variance()
    }
}

/// Cloud state at the step with the highest allocated memory.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationSnapshot {
    pub time: f64,
    pub deployed_vms: usize,
    pub account: ResourceAccount,
}

impl fmt::Display for AllocationSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time [{:.2}], #vms [{}], {}",
            self.time, self.deployed_vms, self.account
        )
    }
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    /// The number of VMs read from the trace. Calculated before simulation starts.
    pub total_vms_in_trace: u64,
    /// The number of successful placements.
    pub vms_deployed: u64,
    /// The number of VMs destroyed after their destroy time passed.
    pub vms_destroyed: u64,
    /// Total number of executed migrations over all clusters.
    pub migrations: u64,
    /// The number of finished simulation steps.
    pub steps: u64,
    /// Maximum number of simultaneously deployed VMs.
    pub peak_deployed_vms: u64,
    /// Earliest step reaching the highest cloud allocated memory. None while nothing is allocated.
    pub peak_allocation: Option<AllocationSnapshot>,

    /// Estimations for the number of deployed VMs, sampled once per step.
    pub deployed_vms_stats: EstimatorWrapper,
    /// Estimations for the per-cluster standard deviation of host allocated memory (GiB) seen
    /// after each rebalancing pass.
    pub memory_allocation_std_stats: EstimatorWrapper,
    /// Same as above for host used CPU (GHz).
    pub cpu_usage_std_stats: EstimatorWrapper,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            deployed_vms_stats: EstimatorWrapper::new(),
            memory_allocation_std_stats: EstimatorWrapper::new(),
            cpu_usage_std_stats: EstimatorWrapper::new(),
            ..Default::default()
        }
    }

    pub fn observe_deployed_vms(&mut self, count: usize) {
        self.peak_deployed_vms = self.peak_deployed_vms.max(count as u64);
        self.deployed_vms_stats.add(count as f64);
    }

    /// Replaces the peak snapshot only when allocated memory strictly exceeds it.
    pub fn observe_cloud_allocation(
        &mut self,
        time: f64,
        account: &ResourceAccount,
        deployed_vms: usize,
    ) {
        let highest = self
            .peak_allocation
            .as_ref()
            .map_or(0, |peak| peak.account.allocated_memory_bytes());
        if account.allocated_memory_bytes() > highest {
            self.peak_allocation = Some(AllocationSnapshot {
                time,
                deployed_vms,
                account: account.clone(),
            });
        }
    }

    pub fn observe_cluster_dispersion(&mut self, memory_allocation_std: f64, cpu_usage_std: f64) {
        self.memory_allocation_std_stats.add(memory_allocation_std);
        self.cpu_usage_std_stats.add(cpu_usage_std);
    }
}
