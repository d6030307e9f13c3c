use fleetsim::core::cloud::Cloud;
use fleetsim::core::cluster::Cluster;
use fleetsim::core::common::Aggregate;
use fleetsim::core::error::SimulationError;
use fleetsim::core::host::HostSpec;
use fleetsim::core::vm::VmState;
use fleetsim::test_util::helpers::{check_accounting_invariants, make_vm, make_vm_with_samples};

fn big_host_spec() -> HostSpec {
    HostSpec {
        number_of_cores: 16,
        core_speed_mhz: 3400,
        memory_mb: 64 * 1024,
    }
}

#[test]
fn test_vm_fits_on_empty_host() {
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 1, &big_host_spec())]).unwrap();
    cloud
        .register_vm(make_vm("vm_1", 4, 3400, 16 * 1024, 0, 100))
        .unwrap();
    cloud.deploy("vm_1", 0).unwrap();
    cloud.recompute_allocation();

    let host = cloud.host(0).unwrap();
    assert_eq!(13600, host.account.allocated_cpu_mhz());
    assert_eq!(16384, host.account.allocated_memory_mb());
    assert_eq!(40800, host.account.available_cpu_mhz());
    assert_eq!(49152, host.account.available_memory_mb());

    let cluster = &cloud.clusters()[0];
    assert_eq!(13600, cluster.account.allocated_cpu_mhz());
    assert_eq!(13600, cloud.account.allocated_cpu_mhz());
    assert_eq!(16384, cloud.account.allocated_memory_mb());
    check_accounting_invariants(&cloud);
}

#[test]
fn test_vm_larger_than_host_is_rejected() {
    let tiny = HostSpec {
        number_of_cores: 1,
        core_speed_mhz: 100,
        memory_mb: 1,
    };
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 1, &tiny)]).unwrap();
    cloud.register_vm(make_vm("vm_1", 2, 100, 1, 0, 100)).unwrap();

    assert_eq!(
        Err(SimulationError::CapacityExhausted {
            vm_id: "vm_1".to_string(),
            requested_cpu_mhz: 200,
            requested_memory_mb: 1,
        }),
        cloud.deploy("vm_1", 0)
    );
    cloud.recompute_allocation();
    assert_eq!(0, cloud.host(0).unwrap().account.allocated_cpu_mhz());
    assert_eq!(VmState::Pending, cloud.vm("vm_1").unwrap().state());
    assert!(cloud.deployed_vms().is_empty());
    check_accounting_invariants(&cloud);
}

#[test]
fn test_migration_moves_allocation_and_usage() {
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 2, &big_host_spec())]).unwrap();
    cloud
        .register_vm(make_vm_with_samples(
            "vm_1",
            2,
            3400,
            4096,
            100,
            &[(0, 1000.0, 2048.0)],
        ))
        .unwrap();
    cloud.deploy("vm_1", 0).unwrap();
    cloud.recompute_allocation();
    cloud.update_usage(0.0);
    assert_eq!(1000, cloud.host(0).unwrap().account.used_cpu_mhz());

    assert_eq!(Ok(true), cloud.migrate("vm_1", 1));
    cloud.recompute_cluster(0);

    assert_eq!(Some(1), cloud.vm("vm_1").unwrap().host());
    assert!(!cloud.host(0).unwrap().has_vm("vm_1"));
    assert_eq!(0, cloud.host(0).unwrap().account.allocated_cpu_mhz());
    assert_eq!(0, cloud.host(0).unwrap().account.used_cpu_mhz());
    assert_eq!(6800, cloud.host(1).unwrap().account.allocated_cpu_mhz());
    assert_eq!(4096, cloud.host(1).unwrap().account.allocated_memory_mb());
    assert_eq!(1000, cloud.host(1).unwrap().account.used_cpu_mhz());
    assert_eq!(6800, cloud.account.allocated_cpu_mhz());
    check_accounting_invariants(&cloud);
}

#[test]
fn test_migration_of_pending_vm_is_a_violation() {
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 2, &big_host_spec())]).unwrap();
    cloud.register_vm(make_vm("vm_1", 1, 1000, 512, 0, 100)).unwrap();

    assert!(matches!(
        cloud.migrate("vm_1", 1),
        Err(SimulationError::PolicyViolation { .. })
    ));
    assert!(matches!(
        cloud.migrate("unknown", 1),
        Err(SimulationError::PolicyViolation { .. })
    ));
}

#[test]
fn test_vm_is_destroyed_after_its_destroy_time() {
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 1, &big_host_spec())]).unwrap();
    cloud.register_vm(make_vm("vm_1", 1, 3400, 1024, 0, 100)).unwrap();
    cloud.deploy("vm_1", 0).unwrap();

    assert!(cloud.destroy_expired(100.0).is_empty());
    assert_eq!(vec!["vm_1".to_string()], cloud.destroy_expired(101.0));
    cloud.recompute_allocation();

    assert!(!cloud.host(0).unwrap().has_vm("vm_1"));
    assert_eq!(0, cloud.account.allocated_cpu_mhz());
    assert_eq!(0, cloud.account.allocated_memory_bytes());
    assert_eq!(VmState::Destroyed, cloud.vm("vm_1").unwrap().state());
    check_accounting_invariants(&cloud);
}

#[test]
fn test_usage_follows_interpolated_demand() {
    let mut cloud = Cloud::new(vec![Cluster::new(0, 0, 1, &big_host_spec())]).unwrap();
    cloud
        .register_vm(make_vm_with_samples(
            "vm_1",
            2,
            3400,
            4096,
            1000,
            &[(0, 500.0, 1000.0), (500, 1500.0, 2000.0)],
        ))
        .unwrap();
    cloud.deploy("vm_1", 0).unwrap();

    cloud.update_usage(250.0);
    assert_eq!(1000, cloud.account.used_cpu_mhz());
    cloud.update_usage(900.0);
    // held at the last sample
    assert_eq!(1500, cloud.account.used_cpu_mhz());
    check_accounting_invariants(&cloud);
}
