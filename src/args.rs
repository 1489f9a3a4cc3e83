// Commandline argument parser using clap for GeoTour

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct TourArgs {
    #[command(subcommand)]
    /// What to do: walk with a receiver, simulate a walk, or manage progress
    pub command: CommandTask,

    /// Tour definition file (RON). The built-in tour is used when omitted
    #[arg(short = 't', long = "tour", global = true)]
    pub tour: Option<PathBuf>,

    /// Directory where progress and completion history are kept
    #[arg(short = 'd', long = "data-dir", global = true, default_value = "geotour-data")]
    pub data_dir: PathBuf,

    /// Directory that narration paths in the tour are relative to
    #[arg(short = 'a', long = "audio-root", global = true, default_value = ".")]
    pub audio_root: PathBuf,

    /// Also append every tour event to this file, one JSON object per line
    #[arg(short = 'j', long = "journal", global = true)]
    pub journal: Option<PathBuf>,

    /// Log events instead of drawing the status screen
    #[arg(long, global = true)]
    pub plain: bool,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Walk the tour with a GPS receiver on a serial port
    #[command(about)]
    Walk(WalkCommand),

    /// Walk the tour with a simulated receiver
    #[command(about)]
    Simulate(SimulateCommand),

    /// Inspect, export or reset saved progress
    #[command(about)]
    Progress(ProgressCommand),

    /// Validate the tour definition and run a few sanity checks
    #[command(about)]
    Check,
}

#[derive(Debug, Args, Clone)]
pub struct WalkCommand {
    /// Serial device of the receiver. Asked for interactively when omitted
    #[arg(long)]
    pub device: Option<String>,

    /// Baud rate of the receiver
    #[arg(short = 'b', long, default_value_t = 9600)]
    pub baud: u32,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateCommand {
    /// Extra jitter added to every simulated fix, in metres
    #[arg(short = 'n', long, default_value_t = 0.0)]
    pub noise: f64,

    /// Time between simulated fixes. Defaults to the tour's GPS interval
    #[arg(short = 'i', long = "interval-ms")]
    pub interval_ms: Option<u64>,

    /// Seed for a reproducible walk
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct ProgressCommand {
    #[command(subcommand)]
    pub action: ProgressAction,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ProgressAction {
    /// Print statistics and achievements
    Show,

    /// Write the shareable export document as JSON
    Export {
        /// Output file. Printed to stdout when omitted
        #[arg(short = 'o', long = "out")]
        outfile: Option<PathBuf>,
    },

    /// Delete all saved progress
    Reset,
}
