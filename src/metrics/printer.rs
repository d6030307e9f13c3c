use prettytable::{row, Table};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::Write};

use crate::core::common::BYTES_PER_MB;
use crate::metrics::collector::{AllocationSnapshot, EstimatorWrapper, MetricsCollector};

#[derive(Debug, Default, Deserialize, PartialEq)]
pub enum OutputFormat {
    #[default]
    JSON,
    PrettyTable,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct MetricsPrinterConfig {
    #[serde(default)]
    pub format: OutputFormat,
    pub output_file: std::path::PathBuf,
}

pub fn print_metrics(
    collector: &MetricsCollector,
    config: &MetricsPrinterConfig,
) -> std::io::Result<()> {
    let mut metrics_file = File::create(&config.output_file)?;
    match config.format {
        OutputFormat::PrettyTable => print_metrics_as_pretty_table(collector, &mut metrics_file),
        OutputFormat::JSON => print_metrics_as_json(collector, &mut metrics_file),
    }
}

pub fn print_metrics_as_pretty_table(
    metrics: &MetricsCollector,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    let mut aggregated_table = Table::new();
    aggregated_table.add_row(row!["Metric", "Count"]);
    aggregated_table.add_row(row!["Total VMs in trace", metrics.total_vms_in_trace]);
    aggregated_table.add_row(row!["VMs deployed", metrics.vms_deployed]);
    aggregated_table.add_row(row!["VMs destroyed", metrics.vms_destroyed]);
    aggregated_table.add_row(row!["Migrations", metrics.migrations]);
    aggregated_table.add_row(row!["Steps", metrics.steps]);
    aggregated_table.add_row(row!["Peak deployed VMs", metrics.peak_deployed_vms]);
    if let Some(peak) = &metrics.peak_allocation {
        aggregated_table.add_row(row![
            "Peak allocated memory (MB)",
            peak.account.allocated_memory_mb()
        ]);
        aggregated_table.add_row(row!["Peak allocation time", peak.time]);
    }

    let mut stats_table = Table::new();
    stats_table.add_row(row!["Metric", "Min", "Max", "Mean", "Variance"]);
    for (name, stats) in [
        ("Deployed VMs", &metrics.deployed_vms_stats),
        ("Memory allocation STD (GiB)", &metrics.memory_allocation_std_stats),
        ("CPU usage STD (GHz)", &metrics.cpu_usage_std_stats),
    ] {
        stats_table.add_row(row![
            name,
            stats.min(),
            stats.max(),
            stats.mean(),
            stats.population_variance()
        ]);
    }

    aggregated_table.print(out)?;
    stats_table.print(out)?;
    Ok(())
}

#[derive(Serialize)]
struct MetricsJSON {
    counters: Counters,
    peak_allocation: Option<PeakAllocation>,
    stats: Stats,
}

#[derive(Serialize)]
struct PeakAllocation {
    time: f64,
    deployed_vms: usize,
    allocated_memory_mb: u64,
    allocated_cpu_mhz: u64,
    used_memory_mb: u64,
    used_cpu_mhz: u64,
}

impl From<&AllocationSnapshot> for PeakAllocation {
    fn from(snapshot: &AllocationSnapshot) -> Self {
        Self {
            time: snapshot.time,
            deployed_vms: snapshot.deployed_vms,
            allocated_memory_mb: snapshot.account.allocated_memory_mb(),
            allocated_cpu_mhz: snapshot.account.allocated_cpu_mhz(),
            used_memory_mb: snapshot.account.used_memory_bytes() / BYTES_PER_MB,
            used_cpu_mhz: snapshot.account.used_cpu_mhz(),
        }
    }
}

#[derive(Serialize)]
struct Counters {
    total_vms_in_trace: u64,
    vms_deployed: u64,
    vms_destroyed: u64,
    migrations: u64,
    steps: u64,
    peak_deployed_vms: u64,
}

#[derive(Serialize)]
struct Stats {
    deployed_vms: EstimatorStats,
    memory_allocation_std_gib: EstimatorStats,
    cpu_usage_std_ghz: EstimatorStats,
}

#[derive(Serialize)]
struct EstimatorStats {
    min: f64,
    max: f64,
    mean: f64,
    variance: f64,
}

impl From<&EstimatorWrapper> for EstimatorStats {
    fn from(estimator: &EstimatorWrapper) -> Self {
        Self {
            min: estimator.min(),
            max: estimator.max(),
            mean: estimator.mean(),
            variance: estimator.population_variance(),
        }
    }
}

pub fn print_metrics_as_json(
    metrics: &MetricsCollector,
    out: &mut dyn Write,
) -> std::io::Result<()> {
    let metrics = MetricsJSON {
        counters: Counters {
            total_vms_in_trace: metrics.total_vms_in_trace,
            vms_deployed: metrics.vms_deployed,
            vms_destroyed: metrics.vms_destroyed,
            migrations: metrics.migrations,
            steps: metrics.steps,
            peak_deployed_vms: metrics.peak_deployed_vms,
        },
        peak_allocation: metrics.peak_allocation.as_ref().map(Into::into),
        stats: Stats {
            deployed_vms: (&metrics.deployed_vms_stats).into(),
            memory_allocation_std_gib: (&metrics.memory_allocation_std_stats).into(),
            cpu_usage_std_ghz: (&metrics.cpu_usage_std_stats).into(),
        },
    };

    let serialized_json = serde_json::to_string_pretty(&metrics)?;
    out.write_all(serialized_json.as_bytes())
}
