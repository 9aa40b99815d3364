use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::errors::ConfigError;
use crate::types::Config;

static CONFIG_FILE: &str = "Subsurface Toolbox/config.yml";

#[derive(Parser, Debug)]
#[command(author, version, about, name = "Subsurface Toolbox")]
pub struct Cli {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Path to the configuration file
    #[arg(short, long, value_hint = ValueHint::FilePath, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set the default water salinity on dive computers without one
    FixSalinity(DiveLogOptions),
    /// Copy device serial numbers into the dive computer blocks
    FixSerial(DiveLogOptions),
    /// Remove redundant dive samples
    Compact(DiveLogOptions),
    /// Write time zone markers to dive sites and unlocated dives
    Timezone {
        #[command(flatten)]
        options: DiveLogOptions,
        /// Time zone for dives and sites without a position (e.g. +0100)
        #[arg(long)]
        tz: Option<String>,
        /// Overwrite existing time zone markers
        #[arg(long)]
        replace: bool,
    },
    /// List dives with their start time and time zone
    Dives {
        /// Subsurface dive log
        #[arg(value_hint = ValueHint::FilePath)]
        ssrf: PathBuf,
        /// Time zone for dives without any time zone information
        #[arg(long)]
        tz: Option<String>,
    },
    /// Render every located dive as a GPX track
    DivesGpx {
        #[command(flatten)]
        options: DiveLogOptions,
        /// Seconds between track points
        #[arg(long)]
        interval: Option<i64>,
        #[command(flatten)]
        track: TrackOptions,
    },
    /// Export dive sites as GPX waypoints
    SitesGpx(DiveLogOptions),
    /// Locate dives and dive sites from a GPX track
    MergeGpx {
        #[command(flatten)]
        options: DiveLogOptions,
        /// GPS track
        #[arg(value_hint = ValueHint::FilePath)]
        gpx: PathBuf,
    },
    /// Lower a GPX track by the dive depth at each point
    GpxDepth {
        #[command(flatten)]
        options: DiveLogOptions,
        /// GPS track
        #[arg(value_hint = ValueHint::FilePath)]
        gpx: PathBuf,
        #[command(flatten)]
        track: TrackOptions,
    },
    /// Look up position, depth and temperature for a list of instants
    DateFusion(FusionOptions),
}

#[derive(Args, Debug)]
pub struct DiveLogOptions {
    /// Subsurface dive log
    #[arg(value_hint = ValueHint::FilePath)]
    pub ssrf: PathBuf,
    /// Output file, standard output if omitted
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TrackOptions {
    /// Add start and end waypoints to every track
    #[arg(long)]
    pub track_poi: bool,
    /// Collapse consecutive points that do not move
    #[arg(long)]
    pub detect_stops: bool,
}

#[derive(Args, Debug)]
pub struct FusionOptions {
    /// File with one date per line
    #[arg(value_hint = ValueHint::FilePath)]
    pub dates: PathBuf,
    /// Subsurface dive log
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub ssrf: Option<PathBuf>,
    /// GPS track
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub gpx: Option<PathBuf>,
    /// Time zone of dates without an offset
    #[arg(long)]
    pub tz: Option<String>,
    /// Output file, standard output if omitted
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Loads the configuration file. A missing file at the default location
    /// means defaults; a missing file given with `--config` is an error.
    pub fn config(&self) -> Result<Config, ConfigError> {
        match &self.config {
            Some(path) => Config::load(path),
            None => match dirs::config_dir().map(|dir| dir.join(CONFIG_FILE)) {
                Some(path) if path.exists() => Config::load(&path),
                _ => Ok(Config::default()),
            },
        }
    }
}
