//! Simulation callbacks interface and implementations to define how simulator should behave on start,
//! step, finish and when it should stop running.

use log::{error, info};

use crate::{metrics::printer::print_metrics, simulator::FleetSimulation};

pub trait SimulationCallbacks {
    /// Runs before starting a simulation run.
    fn on_simulation_start(&mut self, _sim: &mut FleetSimulation) {}

    /// Runs after each step of a simulation run, returns false if the simulation must be stopped.
    fn on_step(&mut self, _sim: &mut FleetSimulation) -> bool {
        true
    }

    /// Runs upon the completion of a simulation run.
    fn on_simulation_finish(&mut self, _sim: &mut FleetSimulation) {}
}

/// Steps until the trace time range is over, then prints metrics if configured.
pub struct RunUntilTraceIsOverCallbacks {}

impl SimulationCallbacks for RunUntilTraceIsOverCallbacks {
    fn on_simulation_start(&mut self, sim: &mut FleetSimulation) {
        info!(
            "Starting simulation of {} vms at time {} with step {}",
            sim.metrics.total_vms_in_trace,
            sim.current_time(),
            sim.step_size()
        );
    }

    fn on_simulation_finish(&mut self, sim: &mut FleetSimulation) {
        if let Some(printer_config) = sim.config.metrics_printer.as_ref() {
            if let Err(e) = print_metrics(&sim.metrics, printer_config) {
                error!(
                    "Failed to print metrics to {:?}: {}",
                    printer_config.output_file, e
                );
            }
        }
    }
}
