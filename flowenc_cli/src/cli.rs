//! Command-line surface of `flowenc` plus process-wide statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set once from `--json`; error reporting in `main` reads it.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "flowenc",
    version,
    about = "Virtual quadrature encoder driven by an optical-flow sensor"
)]
pub struct Cli {
    /// Encoder configuration file (TOML)
    #[arg(long, value_name = "FILE", default_value = "etc/flowenc.toml")]
    pub config: PathBuf,

    /// Optional pixel-scale calibration CSV (strict header `pixels,mm`)
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// Emit logs, summaries and errors as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level; RUST_LOG overrides it
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// How much of the address space `--rt` pins in RAM.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Pages resident at startup
    Current,
    /// Resident pages plus later allocations
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[cfg(target_os = "macos")]
        {
            return RtLock::None;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

/// Real-time knobs shared by commands that run the loop.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct RtArgs {
    /// Run the loop with real-time scheduling and locked memory
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, pins to one CPU, and calls mlockall to keep the loop's pages resident. This reduces jitter on the encoder outputs but may require elevated privileges or ulimits (e.g., memlock).\n\nmacOS: Only mlockall is applied; SCHED_FIFO/affinity are unavailable."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority (Linux); clamped to the OS range
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// Memory lock mode used with --rt
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// Real-time CPU index to pin the process to (Linux only). Defaults to 0.
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the encoder loop until Ctrl-C (or --cycles)
    Run {
        /// Stop after this many cycles
        #[arg(long, value_name = "N")]
        cycles: Option<u64>,
        /// Force the simulated sensor and pins regardless of config
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
        /// Print loop timing and sensor statistics
        #[arg(long, action = ArgAction::SetTrue)]
        stats: bool,
        /// Log the latest encoder snapshot every MS milliseconds
        #[arg(long, value_name = "MS")]
        report_ms: Option<u64>,
        #[command(flatten)]
        rt: RtArgs,
    },
    /// Initialise the sensor once and take a single reading
    SelfCheck {
        /// Use the simulated sensor regardless of config
        #[arg(long, action = ArgAction::SetTrue)]
        simulate: bool,
    },
    /// Validate config and calibration only
    Health,
}
