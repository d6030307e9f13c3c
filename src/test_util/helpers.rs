use crate::config::SimulationConfig;
use crate::core::cloud::Cloud;
use crate::core::common::{TraceTime, BYTES_PER_MB};
use crate::core::demand::{DemandSample, DemandSeries};
use crate::core::vm::{ServiceOffering, VirtualMachine};
use crate::simulation_callbacks::SimulationCallbacks;
use crate::simulator::FleetSimulation;

/// VM with a single demand sample at `deploy_time` using half of the requested capacity.
pub fn make_vm(
    id: &str,
    cores: u64,
    core_speed_mhz: u64,
    memory_mb: u64,
    deploy_time: TraceTime,
    destroy_time: TraceTime,
) -> VirtualMachine {
    let samples = [(
        deploy_time,
        (cores * core_speed_mhz) as f64 / 2.0,
        memory_mb as f64 / 2.0,
    )];
    make_vm_with_samples(id, cores, core_speed_mhz, memory_mb, destroy_time, &samples)
}

/// VM deployed at its first sample time with the given `(time, cpu_mhz, memory_mb)` samples.
pub fn make_vm_with_samples(
    id: &str,
    cores: u64,
    core_speed_mhz: u64,
    memory_mb: u64,
    destroy_time: TraceTime,
    samples: &[(TraceTime, f64, f64)],
) -> VirtualMachine {
    let mut demand = DemandSeries::new();
    for (time, cpu, memory) in samples {
        demand
            .add_sample(*time, DemandSample::new(*cpu, *memory))
            .unwrap();
    }
    VirtualMachine::new(
        id.to_string(),
        demand.first_time().unwrap_or(0),
        destroy_time,
        ServiceOffering::new("test", cores, core_speed_mhz, memory_mb),
        demand,
    )
}

pub fn default_test_simulation_config(with_suffix: Option<&str>) -> SimulationConfig {
    let mut default = r#"
    sim_name: "test_fleetsim"
    minutes_per_iteration: 5
    "#
    .to_string();

    if let Some(suffix) = with_suffix {
        default.push_str(suffix);
    }

    SimulationConfig::from_yaml(&default).unwrap()
}

/// Asserts capacity, conservation and single-host invariants of the whole fleet.
pub fn check_accounting_invariants(cloud: &Cloud) {
    let mut cloud_cpu = 0;
    let mut cloud_memory = 0;
    let mut cloud_used_cpu = 0;
    let mut cloud_used_memory = 0;
    let mut placed_vms = 0;

    for cluster in cloud.clusters() {
        let mut cluster_cpu = 0;
        let mut cluster_memory = 0;
        let mut cluster_used_cpu = 0;
        for host in cluster.hosts() {
            let account = &host.account;
            assert!(account.allocated_cpu_mhz() <= account.total_cpu_mhz());
            assert!(account.allocated_memory_bytes() <= account.total_memory_bytes());

            let requested_cpu: u64 = host.vms().values().map(|p| p.requested.cpu_mhz).sum();
            let requested_memory: u64 = host.vms().values().map(|p| p.requested.memory_mb).sum();
            assert_eq!(requested_cpu, account.allocated_cpu_mhz());
            assert_eq!(requested_memory * BYTES_PER_MB, account.allocated_memory_bytes());

            for vm_id in host.vms().keys() {
                let vm = cloud.vm(vm_id).unwrap();
                assert!(vm.is_deployed());
                assert_eq!(Some(host.id()), vm.host());
                assert!(cloud.deployed_vms().contains(vm_id));
            }
            placed_vms += host.vm_count();

            cluster_cpu += account.allocated_cpu_mhz();
            cluster_memory += account.allocated_memory_bytes();
            cluster_used_cpu += account.used_cpu_mhz();
        }
        assert_eq!(cluster_cpu, cluster.account.allocated_cpu_mhz());
        assert_eq!(cluster_memory, cluster.account.allocated_memory_bytes());
        assert_eq!(cluster_used_cpu, cluster.account.used_cpu_mhz());

        cloud_cpu += cluster.account.allocated_cpu_mhz();
        cloud_memory += cluster.account.allocated_memory_bytes();
        cloud_used_cpu += cluster.account.used_cpu_mhz();
        cloud_used_memory += cluster.account.used_memory_bytes();
    }
    assert_eq!(cloud_cpu, cloud.account.allocated_cpu_mhz());
    assert_eq!(cloud_memory, cloud.account.allocated_memory_bytes());
    assert_eq!(cloud_used_cpu, cloud.account.used_cpu_mhz());
    assert_eq!(cloud_used_memory, cloud.account.used_memory_bytes());

    assert_eq!(placed_vms, cloud.deployed_vms().len());
    for vm in cloud.vms() {
        assert_eq!(vm.is_deployed(), vm.host().is_some());
    }
}

/// Checks accounting invariants after every step.
pub struct InvariantsCheckingCallbacks {}

impl SimulationCallbacks for InvariantsCheckingCallbacks {
    fn on_step(&mut self, sim: &mut FleetSimulation) -> bool {
        check_accounting_invariants(&sim.cloud);
        true
    }
}
