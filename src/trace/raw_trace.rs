//! Reader of raw task usage traces.
//!
//! Each line is `time jobId taskId jobType normalizedCores normalizedMemory`, whitespace
//! separated, with usage normalized to [0, 1]. Every job becomes one VM whose demand at a time is
//! the sum of its tasks' usage at that time.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::warn;

use crate::core::common::TraceTime;
use crate::core::demand::{DemandSample, DemandSeries};
use crate::core::error::SimulationError;
use crate::core::vm::{ServiceOffering, VirtualMachine};
use crate::trace::interface::{read_input_file, Trace};

pub const CPU_MIN_MHZ: f64 = 100.0;
pub const CPU_MAX_MHZ: f64 = 3400.0;
pub const MEMORY_MIN_MB: f64 = 25.0;
pub const MEMORY_MAX_MB: f64 = 2048.0;

pub fn denormalize(normalized: f64, min: f64, max: f64) -> f64 {
    normalized * (max - min) + min
}

#[derive(Debug, PartialEq)]
struct RawTaskSample {
    time: TraceTime,
    job_id: String,
    task_id: String,
    normalized_cores: f64,
    normalized_memory: f64,
}

fn parse_line(line_no: u64, line: &str) -> Result<RawTaskSample, SimulationError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(SimulationError::malformed(
            line_no,
            format!("expected 6 fields, got {}", fields.len()),
        ));
    }
    let time = fields[0]
        .parse::<TraceTime>()
        .map_err(|e| SimulationError::malformed(line_no, format!("time {:?}: {}", fields[0], e)))?;
    let normalized = |field: &str| -> Result<f64, SimulationError> {
        let value = field
            .parse::<f64>()
            .map_err(|e| SimulationError::malformed(line_no, format!("{:?}: {}", field, e)))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(SimulationError::malformed(
                line_no,
                format!("normalized value {} is outside [0, 1]", value),
            ));
        }
        Ok(value)
    };
    Ok(RawTaskSample {
        time,
        job_id: fields[1].to_string(),
        task_id: fields[2].to_string(),
        normalized_cores: normalized(fields[4])?,
        normalized_memory: normalized(fields[5])?,
    })
}

/// Picks the smallest offering covering `peak`, or the largest one if none does.
pub fn pick_offering(catalog: &[ServiceOffering], peak: &DemandSample) -> Option<ServiceOffering> {
    let mut sorted: Vec<&ServiceOffering> = catalog.iter().collect();
    sorted.sort_by_key(|offering| {
        let requested = offering.requested();
        (requested.cpu_mhz, requested.memory_mb)
    });
    let fitting = sorted.iter().find(|offering| {
        let requested = offering.requested();
        requested.cpu_mhz as f64 >= peak.cpu_mhz && requested.memory_mb as f64 >= peak.memory_mb
    });
    match fitting {
        Some(offering) => Some((*offering).clone()),
        None => {
            let largest = sorted.last()?;
            warn!(
                "No offering covers peak demand [{}Mhz, {}MB], using {:?}",
                peak.cpu_mhz, peak.memory_mb, largest.name
            );
            Some((*largest).clone())
        }
    }
}

pub struct RawTaskTrace {
    jobs: Vec<(String, DemandSeries)>,
    catalog: Vec<ServiceOffering>,
}

impl RawTaskTrace {
    pub fn from_str(
        trace_str: &str,
        catalog: Vec<ServiceOffering>,
    ) -> Result<Self, SimulationError> {
        if catalog.is_empty() {
            return Err(SimulationError::Config(
                "service offering catalog is empty".to_string(),
            ));
        }

        let mut jobs: Vec<(String, DemandSeries)> = vec![];
        let mut job_index: HashMap<String, usize> = Default::default();
        // (job, task, time) triples seen so far
        let mut task_samples: HashSet<(String, String, TraceTime)> = Default::default();

        for (idx, line) in trace_str.lines().enumerate() {
            let line_no = idx as u64 + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let sample = parse_line(line_no, trimmed)?;
            let task_key = (sample.job_id.clone(), sample.task_id.clone(), sample.time);
            if !task_samples.insert(task_key) {
                return Err(SimulationError::malformed(
                    line_no,
                    format!(
                        "duplicate sample at time {} for task {:?} of job {:?}",
                        sample.time, sample.task_id, sample.job_id
                    ),
                ));
            }

            let job = *job_index.entry(sample.job_id.clone()).or_insert_with(|| {
                jobs.push((sample.job_id.clone(), DemandSeries::new()));
                jobs.len() - 1
            });
            jobs[job].1.accumulate(
                sample.time,
                DemandSample::new(
                    denormalize(sample.normalized_cores, CPU_MIN_MHZ, CPU_MAX_MHZ),
                    denormalize(sample.normalized_memory, MEMORY_MIN_MB, MEMORY_MAX_MB),
                ),
            );
        }

        Ok(Self { jobs, catalog })
    }

    pub fn from_file(path: &Path, catalog: Vec<ServiceOffering>) -> Result<Self, SimulationError> {
        Self::from_str(&read_input_file(path)?, catalog)
    }
}

impl Trace for RawTaskTrace {
    fn convert_to_virtual_machines(&mut self) -> Result<Vec<VirtualMachine>, SimulationError> {
        let mut vms = Vec::with_capacity(self.jobs.len());
        for (job_id, demand) in std::mem::take(&mut self.jobs) {
            let (Some(deploy_time), Some(destroy_time)) = (demand.first_time(), demand.last_time())
            else {
                continue;
            };
            let offering = pick_offering(&self.catalog, &demand.peak()).ok_or_else(|| {
                SimulationError::Config("service offering catalog is empty".to_string())
            })?;
            vms.push(VirtualMachine::new(job_id, deploy_time, destroy_time, offering, demand));
        }
        Ok(vms)
    }
}
