use clap::Parser;
use std::path::PathBuf;

use crate::planner::{KeepPeriod, Priority};
use crate::retention::Grouping;

#[derive(Parser, Debug)]
#[command(name = "dashsync")]
#[command(about = "Synchronizes dashcam recordings with a local directory", version)]
pub struct Args {
    /// Dashcam IP address or hostname
    #[arg(value_name = "ADDRESS")]
    pub address: String,

    /// Destination directory for downloaded recordings
    #[arg(short, long, default_value = ".")]
    pub destination: PathBuf,

    /// Keep recordings in the given range (e.g. 3d, 2w), removing older
    /// ones; defaults to days
    #[arg(short, long, value_name = "KEEP_RANGE")]
    pub keep: Option<KeepPeriod>,

    /// Download priority
    #[arg(short, long, value_enum, default_value_t = Priority::Date)]
    pub priority: Priority,

    /// Group downloaded recordings in subdirectories by time period
    #[arg(short, long, value_enum, default_value_t = Grouping::None)]
    pub grouping: Grouping,

    /// Stop downloading when the destination disk is over this percentage
    /// used
    #[arg(
        short = 'u',
        long,
        value_name = "DISK_USAGE_PERCENT",
        default_value_t = 90,
        value_parser = clap::value_parser!(u8).range(5..=98)
    )]
    pub max_used_disk: u8,

    /// Connection timeout in seconds
    #[arg(short, long, default_value_t = 10.0)]
    pub timeout: f64,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet down output messages; overrides verbosity options
    #[arg(short, long)]
    pub quiet: bool,

    /// Cron mode: only report normal and manual downloads at default
    /// verbosity
    #[arg(long)]
    pub cron: bool,

    /// Show what the program would do without downloading or removing
    /// anything
    #[arg(long)]
    pub dry_run: bool,
}
