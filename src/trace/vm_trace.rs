//! Reader of the simulation-ready VM trace.
//!
//! Every non-comment line is one demand sample of one VM:
//! `time, vmId, deployTime, destroyTime, offeringName, numberOfCores, totalAllocatedCpuMhz,
//! allocatedMemoryMb, usedCpuMhz, usedMemoryMb`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::core::common::TraceTime;
use crate::core::demand::{DemandSample, DemandSeries, DuplicateSample};
use crate::core::error::SimulationError;
use crate::core::vm::{ServiceOffering, VirtualMachine};
use crate::trace::interface::{read_input_file, Trace};

#[derive(Debug, Deserialize, PartialEq)]
struct VmTraceRecord {
    time: TraceTime,
    vm_id: String,
    deploy_time: TraceTime,
    destroy_time: TraceTime,
    offering_name: String,
    number_of_cores: u64,
    total_allocated_cpu_mhz: u64,
    allocated_memory_mb: u64,
    used_cpu_mhz: f64,
    used_memory_mb: f64,
}

impl VmTraceRecord {
    fn offering(&self, line: u64) -> Result<ServiceOffering, SimulationError> {
        if self.number_of_cores == 0 {
            return Err(SimulationError::malformed(
                line,
                format!("vm {:?} has zero cores", self.vm_id),
            ));
        }
        // truncated, as traces are written with speed times cores
        let core_speed_mhz = self.total_allocated_cpu_mhz / self.number_of_cores;
        Ok(ServiceOffering::new(
            &self.offering_name,
            self.number_of_cores,
            core_speed_mhz,
            self.allocated_memory_mb,
        ))
    }
}

pub struct VmTrace {
    records: Vec<(u64, VmTraceRecord)>,
}

impl VmTrace {
    pub fn from_str(trace_str: &str) -> Result<Self, SimulationError> {
        Ok(Self {
            records: read_vm_trace_from_str(trace_str)?,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, SimulationError> {
        Self::from_str(&read_input_file(path)?)
    }
}

fn read_vm_trace_from_str(trace_str: &str) -> Result<Vec<(u64, VmTraceRecord)>, SimulationError> {
    let mut trace = vec![];

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(trace_str.as_bytes());

    for row in csv_reader.records() {
        let row = row.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            SimulationError::malformed(line, e.to_string())
        })?;
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        let record: VmTraceRecord = row
            .deserialize(None)
            .map_err(|e| SimulationError::malformed(line, e.to_string()))?;
        trace.push((line, record));
    }
    Ok(trace)
}

impl Trace for VmTrace {
    fn convert_to_virtual_machines(&mut self) -> Result<Vec<VirtualMachine>, SimulationError> {
        let mut vms: Vec<VirtualMachine> = vec![];
        let mut vm_index: HashMap<String, usize> = Default::default();

        for (line, record) in std::mem::take(&mut self.records) {
            let offering = record.offering(line)?;
            let idx = match vm_index.get(&record.vm_id) {
                Some(&idx) => {
                    let vm = &vms[idx];
                    if vm.deploy_time != record.deploy_time
                        || vm.destroy_time != record.destroy_time
                        || vm.offering != offering
                    {
                        return Err(SimulationError::malformed(
                            line,
                            format!("vm {:?} changes its lifetime or offering", record.vm_id),
                        ));
                    }
                    idx
                }
                None => {
                    vm_index.insert(record.vm_id.clone(), vms.len());
                    vms.push(VirtualMachine::new(
                        record.vm_id.clone(),
                        record.deploy_time,
                        record.destroy_time,
                        offering,
                        DemandSeries::new(),
                    ));
                    vms.len() - 1
                }
            };

            vms[idx]
                .demand
                .add_sample(
                    record.time,
                    DemandSample::new(record.used_cpu_mhz, record.used_memory_mb),
                )
                .map_err(|DuplicateSample(time)| {
                    SimulationError::malformed(
                        line,
                        format!("duplicate sample at time {} for vm {:?}", time, record.vm_id),
                    )
                })?;
        }

        Ok(vms)
    }
}
