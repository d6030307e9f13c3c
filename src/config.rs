//! Config fields definitions for fleet simulation

use serde::Deserialize;

use crate::core::error::SimulationError;
use crate::core::host::HostSpec;
use crate::core::vm::ServiceOffering;
use crate::metrics::printer::MetricsPrinterConfig;

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub sim_name: String,
    /// Simulated minutes covered by one engine iteration.
    pub minutes_per_iteration: f64,
    /// Length in minutes of the interval the whole trace represents.
    pub monitored_interval_minutes: f64,
    /// If not set default output of logs is stderr
    pub logs_filepath: Option<String>,
    pub placement_policy: String,
    pub rebalancing_policy: String,
    /// Upper bound of migrations a rebalancing policy may propose per cluster per step.
    pub max_migrations_per_cluster: usize,
    pub cloud: Vec<ClusterGroup>,
    /// Catalog the raw trace reader picks VM offerings from.
    pub service_offerings: Vec<ServiceOffering>,
    pub metrics_printer: Option<MetricsPrinterConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClusterGroup {
    #[serde(default = "one")]
    pub cluster_count: u32,
    pub host_count: u32,
    pub host_template: HostSpec,
}

fn one() -> u32 {
    1
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sim_name: "fleetsim".to_string(),
            minutes_per_iteration: 5.0,
            // monitored interval of the version 1 google cluster traces
            monitored_interval_minutes: 7.0 * 60.0,
            logs_filepath: None,
            placement_policy: "SmallestClusterFirst".to_string(),
            rebalancing_policy: "NoOp".to_string(),
            max_migrations_per_cluster: 10,
            cloud: default_cloud(),
            service_offerings: default_service_offerings(),
            metrics_printer: None,
        }
    }
}

const DEFAULT_CORE_SPEED_MHZ: u64 = 3400;

fn cluster_group(cluster_count: u32, host_count: u32, cores: u64, memory_gb: u64) -> ClusterGroup {
    ClusterGroup {
        cluster_count,
        host_count,
        host_template: HostSpec {
            number_of_cores: cores,
            core_speed_mhz: DEFAULT_CORE_SPEED_MHZ,
            memory_mb: memory_gb * 1024,
        },
    }
}

/// Medium, large and enormous host clusters.
pub fn default_cloud() -> Vec<ClusterGroup> {
    vec![
        cluster_group(10, 8, 16, 60),
        cluster_group(3, 8, 32, 100),
        cluster_group(3, 10, 200, 400),
    ]
}

/// General purpose instance tiers, smallest first.
pub fn default_service_offerings() -> Vec<ServiceOffering> {
    [
        ("micro", 1, 1),
        ("small", 1, 2),
        ("medium", 2, 4),
        ("large", 2, 8),
        ("Xlarge", 4, 16),
        ("2Xlarge", 8, 32),
        ("4Xlarge", 16, 64),
        ("10Xlarge", 40, 160),
        ("15Xlarge", 80, 200),
        ("20Xlarge", 120, 260),
        ("25Xlarge", 160, 300),
        ("30Xlarge", 200, 380),
    ]
    .into_iter()
    .map(|(name, cores, memory_gb)| {
        ServiceOffering::new(name, cores, DEFAULT_CORE_SPEED_MHZ, memory_gb * 1024)
    })
    .collect()
}

impl SimulationConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, SimulationError> {
        let config = serde_yaml::from_str::<SimulationConfig>(yaml)
            .map_err(|e| SimulationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SimulationError> {
        if !(self.minutes_per_iteration > 0.0) {
            return Err(SimulationError::Config(format!(
                "minutes_per_iteration must be positive, got {}",
                self.minutes_per_iteration
            )));
        }
        if !(self.monitored_interval_minutes > 0.0) {
            return Err(SimulationError::Config(format!(
                "monitored_interval_minutes must be positive, got {}",
                self.monitored_interval_minutes
            )));
        }
        if self.cloud.iter().all(|group| group.cluster_count == 0) {
            return Err(SimulationError::Config("cloud has no clusters".to_string()));
        }
        if self.cloud.iter().any(|group| group.cluster_count > 0 && group.host_count == 0) {
            return Err(SimulationError::Config("cluster without hosts".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_takes_defaults() {
        let config = SimulationConfig::from_yaml("{}").unwrap();
        assert_eq!(SimulationConfig::default(), config);
    }

    #[test]
    fn test_default_fleet_and_offerings() {
        let config = SimulationConfig::default();
        assert_eq!(420.0, config.monitored_interval_minutes);

        let clusters: u32 = config.cloud.iter().map(|g| g.cluster_count).sum();
        let hosts: u32 = config.cloud.iter().map(|g| g.cluster_count * g.host_count).sum();
        assert_eq!(16, clusters);
        assert_eq!(134, hosts);
        assert_eq!(
            HostSpec {
                number_of_cores: 200,
                core_speed_mhz: 3400,
                memory_mb: 400 * 1024,
            },
            config.cloud[2].host_template
        );

        let offerings = &config.service_offerings;
        assert_eq!(12, offerings.len());
        assert_eq!(ServiceOffering::new("micro", 1, 3400, 1024), offerings[0]);
        assert_eq!(ServiceOffering::new("30Xlarge", 200, 3400, 380 * 1024), offerings[11]);
        assert!(offerings.iter().all(|o| o.core_speed_mhz == 3400));
    }

    #[test]
    fn test_partial_config() {
        let config = SimulationConfig::from_yaml(
            r#"
        sim_name: partial
        minutes_per_iteration: 10
        rebalancing_policy: GreedyAllocationBalancer
        cloud:
        - host_count: 3
          host_template:
            number_of_cores: 8
            core_speed_mhz: 2000
            memory_mb: 32768
        "#,
        )
        .unwrap();
        assert_eq!("partial", config.sim_name);
        assert_eq!(10.0, config.minutes_per_iteration);
        assert_eq!(420.0, config.monitored_interval_minutes);
        assert_eq!(1, config.cloud[0].cluster_count);
        assert_eq!(3, config.cloud[0].host_count);
        assert_eq!("SmallestClusterFirst", config.placement_policy);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        assert!(matches!(
            SimulationConfig::from_yaml("minutes_per_iteration: 0"),
            Err(SimulationError::Config(_))
        ));
        assert!(matches!(
            SimulationConfig::from_yaml("cloud: []"),
            Err(SimulationError::Config(_))
        ));
        assert!(matches!(
            SimulationConfig::from_yaml(
                "cloud: [{host_count: 0, host_template: \
                 {number_of_cores: 1, core_speed_mhz: 1, memory_mb: 1}}]"
            ),
            Err(SimulationError::Config(_))
        ));
        assert!(matches!(
            SimulationConfig::from_yaml("unknown: [1"),
            Err(SimulationError::Config(_))
        ));
    }
}
