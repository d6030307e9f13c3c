use clap::{Parser, ValueEnum};
use file_rotate::{compression::Compression, suffix::AppendCount, ContentLimit, FileRotate};
use log::{error, info};
use std::env;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use fleetsim::config::SimulationConfig;
use fleetsim::core::error::SimulationError;
use fleetsim::simulator::FleetSimulation;
use fleetsim::trace::interface::{read_input_file, Trace};
use fleetsim::trace::raw_trace::RawTaskTrace;
use fleetsim::trace::vm_trace::VmTrace;

const LOG_FILE_LIMIT_BYTES: usize = 64 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TraceFormat {
    /// Simulation-ready csv with one VM demand sample per line
    Vm,
    /// Raw task usage lines with normalized cores and memory
    Raw,
}

#[derive(Parser)]
struct Args {
    /// Path to the input trace file
    trace_file: PathBuf,
    #[clap(short, long)]
    config_file: Option<PathBuf>,
    #[clap(long, value_enum, default_value_t = TraceFormat::Vm)]
    trace_format: TraceFormat,
}

fn init_logger(logs_filepath: Option<&str>) {
    // log level INFO by default
    let mut env_logger_builder = env_logger::builder();
    if env::var("RUST_LOG").is_err() {
        env_logger_builder.filter_level(log::LevelFilter::Info);
    }
    if let Some(path) = logs_filepath {
        let log_file = FileRotate::new(
            path,
            AppendCount::new(LOG_FILES_KEPT),
            ContentLimit::Bytes(LOG_FILE_LIMIT_BYTES),
            Compression::None,
            #[cfg(unix)]
            None,
        );
        env_logger_builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    env_logger_builder.init();
}

fn load_config(config_file: Option<&PathBuf>) -> Result<SimulationConfig, SimulationError> {
    match config_file {
        Some(path) => SimulationConfig::from_yaml(&read_input_file(path)?),
        None => Ok(SimulationConfig::default()),
    }
}

fn run(args: Args, config: SimulationConfig) -> Result<(), SimulationError> {
    info!("Path to trace file: {:?}", args.trace_file);

    let mut trace: Box<dyn Trace> = match args.trace_format {
        TraceFormat::Vm => Box::new(VmTrace::from_file(&args.trace_file)?),
        TraceFormat::Raw => Box::new(RawTaskTrace::from_file(
            &args.trace_file,
            config.service_offerings.clone(),
        )?),
    };

    let mut simulation = FleetSimulation::new(Rc::new(config))?;
    simulation.initialize(trace.as_mut())?;
    simulation.run()
}

fn main() {
    let args = Args::parse();

    // config is read before logging is set up as it decides where logs go
    let config = load_config(args.config_file.as_ref());
    let logs_filepath = config
        .as_ref()
        .ok()
        .and_then(|config| config.logs_filepath.clone());
    init_logger(logs_filepath.as_deref());

    let result = config.and_then(|config| run(args, config));
    if let Err(e) = result {
        error!("Simulation aborted: {}", e);
        process::exit(1);
    }
}
