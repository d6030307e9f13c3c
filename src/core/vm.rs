//! Virtual machine demand descriptors.

use serde::{Deserialize, Serialize};

use crate::core::common::{HostId, Resources, TraceTime, VmId};
use crate::core::demand::DemandSeries;

/// Fixed capacity tier requested by a VM, independent of its measured usage.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ServiceOffering {
    pub name: String,
    pub number_of_cores: u64,
    pub core_speed_mhz: u64,
    pub memory_mb: u64,
}

impl ServiceOffering {
    pub fn new(name: &str, number_of_cores: u64, core_speed_mhz: u64, memory_mb: u64) -> Self {
        Self {
            name: name.to_string(),
            number_of_cores,
            core_speed_mhz,
            memory_mb,
        }
    }

    pub fn requested(&self) -> Resources {
        Resources::new(self.number_of_cores * self.core_speed_mhz, self.memory_mb)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmState {
    Pending,
    Deployed,
    Destroyed,
}

#[derive(Clone, Debug)]
pub struct VirtualMachine {
    pub id: VmId,
    pub deploy_time: TraceTime,
    pub destroy_time: TraceTime,
    pub offering: ServiceOffering,
    pub demand: DemandSeries,
    host: Option<HostId>,
    state: VmState,
}

impl VirtualMachine {
    pub fn new(
        id: VmId,
        deploy_time: TraceTime,
        destroy_time: TraceTime,
        offering: ServiceOffering,
        demand: DemandSeries,
    ) -> Self {
        Self {
            id,
            deploy_time,
            destroy_time,
            offering,
            demand,
            host: None,
            state: VmState::Pending,
        }
    }

    pub fn requested(&self) -> Resources {
        self.offering.requested()
    }

    pub fn host(&self) -> Option<HostId> {
        self.host
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn is_deployed(&self) -> bool {
        self.state == VmState::Deployed
    }

    /// Usage at `time` rounded to whole MHz and MB.
    pub fn usage_at(&self, time: f64) -> Resources {
        match self.demand.usage_at(time) {
            Some(sample) => Resources::new(
                sample.cpu_mhz.max(0.0).round() as u64,
                sample.memory_mb.max(0.0).round() as u64,
            ),
            None => Resources::default(),
        }
    }

    pub(crate) fn set_deployed(&mut self, host: HostId) {
        self.host = Some(host);
        self.state = VmState::Deployed;
    }

    pub(crate) fn set_host(&mut self, host: HostId) {
        self.host = Some(host);
    }

    pub(crate) fn set_destroyed(&mut self) {
        self.host = None;
        self.state = VmState::Destroyed;
    }
}
