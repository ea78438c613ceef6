//! procrec - records system, process and thread accounting from /proc
//! into a self-describing binary trace file.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use procrec::collector::RealFs;
use procrec::error::Error;
use procrec::event_loop::EventLoop;
use procrec::model::{self, ProgramParameters};
use procrec::recorder::{Recorder, pick_output_path};
use procrec::sampler::{Sampler, SamplerConfig};
use procrec::trace::Registry;

/// System activity recorder.
#[derive(Parser)]
#[command(name = "procrec", about = "Records /proc counters into a binary trace", version)]
struct Args {
    /// Sample acquisition period in seconds.
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    period: u32,

    /// Acquisition duration in seconds. Default: record until interrupted.
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    duration: Option<u64>,

    /// Base path of the output trace; the first free BASE-NN.log is used.
    #[arg(short, long)]
    output: String,

    /// Disable threads recording.
    #[arg(long)]
    disable_threads: bool,

    /// Path to the proc filesystem (for testing).
    #[arg(long, default_value = "/proc")]
    proc_root: String,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,

    /// Process names to record. None means all processes.
    processes: Vec<String>,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("procrec={}", level).parse().expect("valid directive"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn run(args: &Args) -> Result<(), Error> {
    let mut registry = Registry::new();
    model::register_records(&mut registry)?;

    let path = pick_output_path(&args.output)?;
    info!("Recording in file {}", path.display());
    let mut recorder = Recorder::create(&path, registry)?;

    let config = SamplerConfig {
        period_secs: args.period,
        record_threads: !args.disable_threads,
        proc_root: args.proc_root.clone().into(),
    };
    let mut sampler = Sampler::new(EventLoop::new()?, config, RealFs::new())?;

    if args.processes.is_empty() {
        info!("Record all processes");
    } else {
        for name in &args.processes {
            sampler.add_process_by_name(name)?;
        }
    }
    sampler.load_processes()?;

    recorder.record(&ProgramParameters {
        params: std::env::args().collect::<Vec<_>>().join(" "),
    })?;
    recorder.record(sampler.system_config())?;

    let abort = sampler.abort_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        abort.abort();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    sampler.run(&mut recorder, args.duration.map(Duration::from_secs))?;

    recorder.flush()?;
    info!("Recording complete");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
