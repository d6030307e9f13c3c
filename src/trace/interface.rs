// Interface for any trace which serves as input to the simulator.

use std::path::Path;

use crate::core::error::SimulationError;
use crate::core::vm::VirtualMachine;

// Trait Trace represents any trace format acceptable by simulator.
pub trait Trace {
    // Any Trace should implement this method to convert its own records into virtual machines
    // with their demand series. VMs are returned in the order they first appear in the trace.
    fn convert_to_virtual_machines(&mut self) -> Result<Vec<VirtualMachine>, SimulationError>;
}

/// Reads the whole file, mapping any failure to a fatal missing-file error.
pub fn read_input_file(path: &Path) -> Result<String, SimulationError> {
    std::fs::read_to_string(path).map_err(|e| SimulationError::MissingFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}
