//! Represents entry point for simulator: the time-stepped engine driving the fleet.

use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info};

use crate::config::SimulationConfig;
use crate::core::cloud::Cloud;
use crate::core::cluster::Cluster;
use crate::core::common::{Aggregate, TraceTime, VmId};
use crate::core::error::SimulationError;
use crate::core::placement::{placement_policy_resolver, select_host, PlacementPolicy};
use crate::core::rebalancing::{rebalancing_policy_resolver, RebalancingPolicy};
use crate::core::vm::{VirtualMachine, VmState};
use crate::metrics::collector::MetricsCollector;
use crate::metrics::dispersion::ClusterDispersion;
use crate::simulation_callbacks::{RunUntilTraceIsOverCallbacks, SimulationCallbacks};
use crate::trace::interface::Trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Initializing,
    Stepping,
    Finished,
}

pub struct FleetSimulation {
    pub config: Rc<SimulationConfig>,
    pub cloud: Cloud,
    pub metrics: MetricsCollector,

    placement: Box<dyn PlacementPolicy>,
    rebalancing: Box<dyn RebalancingPolicy>,

    // trace time -> VMs having a demand sample at that time, consumed from the front
    pending: VecDeque<(TraceTime, Vec<VmId>)>,
    state: SimulationState,
    current_time: f64,
    step_size: f64,
    end_time: f64,
}

/// Builds clusters of the configured groups. Cluster and host ids are assigned sequentially in
/// configuration order.
pub fn build_clusters(config: &SimulationConfig) -> Vec<Cluster> {
    let mut clusters = vec![];
    let mut next_host_id = 0;
    for group in config.cloud.iter() {
        for _ in 0..group.cluster_count {
            let cluster_id = clusters.len() as u32;
            clusters.push(Cluster::new(
                cluster_id,
                next_host_id,
                group.host_count,
                &group.host_template,
            ));
            next_host_id += group.host_count;
        }
    }
    clusters
}

/// `minutes_per_iteration` of `monitored_interval_minutes` expressed in trace time units.
pub fn compute_step_size(
    minutes_per_iteration: f64,
    monitored_interval_minutes: f64,
    first_trace_time: TraceTime,
    last_trace_time: TraceTime,
) -> f64 {
    let span = (last_trace_time - first_trace_time) as f64;
    if span == 0.0 {
        return 1.0;
    }
    minutes_per_iteration * span / monitored_interval_minutes
}

impl FleetSimulation {
    pub fn new(config: Rc<SimulationConfig>) -> Result<Self, SimulationError> {
        info!(
            "Creating fleet simulation {:?} with config: {:?}",
            config.sim_name, config
        );
        config.validate()?;

        let cloud = Cloud::new(build_clusters(&config))?;
        let placement = placement_policy_resolver(&config.placement_policy)?;
        let rebalancing = rebalancing_policy_resolver(
            &config.rebalancing_policy,
            config.max_migrations_per_cluster,
        )?;

        Ok(FleetSimulation {
            config,
            cloud,
            metrics: MetricsCollector::new(),
            placement,
            rebalancing,
            pending: Default::default(),
            state: SimulationState::Initializing,
            current_time: 0.0,
            step_size: 0.0,
            end_time: 0.0,
        })
    }

    pub fn set_placement_policy(&mut self, placement: Box<dyn PlacementPolicy>) {
        self.placement = placement;
    }

    pub fn set_rebalancing_policy(&mut self, rebalancing: Box<dyn RebalancingPolicy>) {
        self.rebalancing = rebalancing;
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn step_size(&self) -> f64 {
        self.step_size
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn initialize(&mut self, trace: &mut dyn Trace) -> Result<(), SimulationError> {
        let vms = trace.convert_to_virtual_machines()?;
        self.load_virtual_machines(vms)
    }

    /// Registers VMs and builds the pending index of demand times.
    pub fn load_virtual_machines(
        &mut self,
        vms: Vec<VirtualMachine>,
    ) -> Result<(), SimulationError> {
        if self.state != SimulationState::Initializing {
            return Err(SimulationError::Config(
                "simulation is already initialized".to_string(),
            ));
        }
        info!(
            "Cloud configuration: clusters [{}] hosts [{}] total memory [{}MB] total cpu [{}Mhz]",
            self.cloud.clusters().len(),
            self.cloud.host_count(),
            self.cloud.account.total_memory_mb(),
            self.cloud.account.total_cpu_mhz()
        );

        let mut index: BTreeMap<TraceTime, Vec<VmId>> = Default::default();
        for vm in vms.iter() {
            for time in vm.demand.times() {
                index.entry(time).or_default().push(vm.id.clone());
            }
        }
        self.metrics.total_vms_in_trace = vms.len() as u64;
        for vm in vms {
            self.cloud.register_vm(vm)?;
        }

        let (first, last) = match (index.keys().next(), index.keys().next_back()) {
            (Some(&first), Some(&last)) => (first, last),
            _ => {
                info!("Trace has no demand samples, nothing to simulate");
                self.state = SimulationState::Finished;
                return Ok(());
            }
        };
        self.step_size = compute_step_size(
            self.config.minutes_per_iteration,
            self.config.monitored_interval_minutes,
            first,
            last,
        );
        self.current_time = first as f64;
        self.end_time = last as f64 + 2.0 * self.step_size;
        self.pending = index.into_iter().collect();
        self.state = SimulationState::Stepping;

        info!(
            "Loaded {} vms with trace time range [{}, {}], step size {}",
            self.metrics.total_vms_in_trace, first, last, self.step_size
        );
        Ok(())
    }

    /// Performs one simulation step. Returns `false` once the simulation is finished.
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        match self.state {
            SimulationState::Initializing => {
                return Err(SimulationError::Config(
                    "simulation is not initialized".to_string(),
                ))
            }
            SimulationState::Finished => return Ok(false),
            SimulationState::Stepping => {}
        }

        info!(
            "Time [{:.3}], cloud state [{}] ",
            self.current_time, self.cloud.account
        );
        self.apply_load()?;
        self.cloud.recompute_allocation();

        let destroyed = self.cloud.destroy_expired(self.current_time);
        info!(
            "Number of virtual machines [{}] destroyed at time [{:.2}]",
            destroyed.len(),
            self.current_time
        );
        self.metrics.vms_destroyed += destroyed.len() as u64;
        self.cloud.recompute_allocation();

        self.cloud.update_usage(self.current_time);

        self.manage_clusters()?;
        self.log_clusters_at_time();

        let deployed_vms = self.cloud.deployed_vms().len();
        self.metrics.steps += 1;
        self.metrics.observe_deployed_vms(deployed_vms);
        self.metrics
            .observe_cloud_allocation(self.current_time, &self.cloud.account, deployed_vms);

        self.current_time += self.step_size;
        if self.current_time > self.end_time {
            self.finish();
            return Ok(false);
        }
        Ok(true)
    }

    fn apply_load(&mut self) -> Result<(), SimulationError> {
        while let Some((time, _)) = self.pending.front() {
            if *time as f64 > self.current_time {
                break;
            }
            let Some((_, vm_ids)) = self.pending.pop_front() else {
                break;
            };
            for vm_id in vm_ids {
                let pending = self
                    .cloud
                    .vm(&vm_id)
                    .map(|vm| vm.state() == VmState::Pending)
                    .unwrap_or(false);
                if pending {
                    self.place(&vm_id)?;
                }
            }
        }
        Ok(())
    }

    fn place(&mut self, vm_id: &str) -> Result<(), SimulationError> {
        let Some(vm) = self.cloud.vm(vm_id) else {
            panic!("vm {:?} is not registered in cloud", vm_id);
        };
        let requested = vm.requested();
        let host_id = select_host(self.placement.as_ref(), self.cloud.clusters(), vm).ok_or_else(
            || SimulationError::CapacityExhausted {
                vm_id: vm_id.to_string(),
                requested_cpu_mhz: requested.cpu_mhz,
                requested_memory_mb: requested.memory_mb,
            },
        )?;
        self.cloud.deploy(vm_id, host_id)?;
        self.metrics.vms_deployed += 1;
        Ok(())
    }

    /// Runs the rebalancing policy over every cluster and executes the resulting plans.
    fn manage_clusters(&mut self) -> Result<(), SimulationError> {
        for cluster_idx in 0..self.cloud.clusters().len() {
            let cluster = &self.cloud.clusters()[cluster_idx];
            let cluster_id = cluster.id();

            let started = Instant::now();
            let plan = {
                let ranked = self.rebalancing.rank_hosts(cluster.hosts().iter().collect());
                self.rebalancing.map_vms_to_target_host(&ranked)
            };
            info!(
                "#migrations [{}] mapped for cluster [{}] at time [{:.2}]; \
                 total processing time [{}] (nanoSeconds)",
                plan.len(),
                cluster_id,
                self.current_time,
                started.elapsed().as_nanos()
            );
            if plan.is_empty() {
                continue;
            }

            self.log_cluster_dispersion(cluster_idx, "before management; ");
            for (vm_id, target) in plan {
                self.check_migration_scope(cluster_idx, &vm_id, target)?;
                if self.cloud.migrate(&vm_id, target)? {
                    self.metrics.migrations += 1;
                }
            }
            self.cloud.recompute_cluster(cluster_idx);
            self.log_cluster_dispersion(cluster_idx, "after management; ");
        }
        Ok(())
    }

    fn log_cluster_dispersion(&self, cluster_idx: usize, prefix: &str) -> ClusterDispersion {
        let cluster = &self.cloud.clusters()[cluster_idx];
        let dispersion = ClusterDispersion::of(cluster);
        info!(
            "Cluster [{}] {}{} at time [{:.2}]",
            cluster.id(),
            prefix,
            dispersion,
            self.current_time
        );
        dispersion
    }

    /// Logs the configuration and dispersion every cluster is left in by the step.
    fn log_clusters_at_time(&mut self) {
        for cluster_idx in 0..self.cloud.clusters().len() {
            let cluster = &self.cloud.clusters()[cluster_idx];
            info!(
                "Cluster configuration at time [{:.2}]: Cluster {}, #hosts [{}], #vms [{}]",
                self.current_time,
                cluster.account,
                cluster.hosts().len(),
                cluster.vm_count()
            );
            let dispersion = self.log_cluster_dispersion(cluster_idx, "");
            self.metrics.observe_cluster_dispersion(
                dispersion.memory_allocated_gib,
                dispersion.cpu_used_ghz,
            );
        }
    }

    fn check_migration_scope(
        &self,
        cluster_idx: usize,
        vm_id: &str,
        target: u32,
    ) -> Result<(), SimulationError> {
        let violation = |reason: &str| SimulationError::PolicyViolation {
            vm_id: vm_id.to_string(),
            reason: reason.to_string(),
        };
        let source_cluster = self
            .cloud
            .vm(vm_id)
            .and_then(|vm| vm.host())
            .and_then(|host| self.cloud.cluster_index_of(host));
        if source_cluster != Some(cluster_idx) {
            return Err(violation("vm is not deployed in the rebalanced cluster"));
        }
        if self.cloud.cluster_index_of(target) != Some(cluster_idx) {
            return Err(violation("target host is outside the rebalanced cluster"));
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.state = SimulationState::Finished;
        info!(
            "Cloud configuration after simulation: {}, #vms [{}]",
            self.cloud.account,
            self.cloud.deployed_vms().len()
        );
        match &self.metrics.peak_allocation {
            Some(peak) => info!("Cloud highestResourceUsage: {}", peak),
            None => info!("Cloud highestResourceUsage: nothing was allocated"),
        }
        info!("Total migrations [{}]", self.metrics.migrations);
        debug!("Final metrics: {:?}", self.metrics);
    }

    pub fn run_with_callbacks(
        &mut self,
        mut callbacks: Box<dyn SimulationCallbacks>,
    ) -> Result<(), SimulationError> {
        callbacks.on_simulation_start(self);

        let t = Instant::now();
        while self.step()? {
            if !callbacks.on_step(self) {
                break;
            }
        }
        info!("Simulation wall time [{}ns]", t.elapsed().as_nanos());
        info!(
            "Processed {} steps, finished at {}",
            self.metrics.steps, self.current_time
        );

        callbacks.on_simulation_finish(self);
        Ok(())
    }

    pub fn run(&mut self) -> Result<(), SimulationError> {
        self.run_with_callbacks(Box::new(RunUntilTraceIsOverCallbacks {}))
    }
}
