//! Command-line argument definitions for the LRAUV processor
//!
//! Two subcommands: `resample` discovers, validates and resamples mission
//! logs; `monthly` drives the campaign database loads.

use crate::constants::DEFAULT_RESAMPLE_FREQ;
use crate::error::{LrauvError, Result};
use crate::models::{Profile, ResampleFrequency, RunOptions, TimeWindow};
use crate::monthly::{MonthSelection, YearMonth};
use crate::window::{MonthSelector, month_window, resolve_window};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the LRAUV mission log processor
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lrauv_processor",
    version,
    about = "Discover, validate and resample LRAUV mission logs",
    long_about = "Crawls the THREDDS catalog of LRAUV mission logs, checks the time coverage \
                  of each mirrored log against a requested window and resamples the logs that \
                  fall inside it onto a fixed time base. The monthly subcommand loads the \
                  resampled data into per-month campaign databases."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors. Overrides verbose settings.
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// JSON config file; defaults to `<config dir>/lrauv-processor/config.json`
    #[arg(short = 'c', long = "config", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

impl Args {
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Progress bars are hidden in quiet mode
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Discover, validate and resample mission logs
    Resample(ResampleArgs),
    /// Load monthly campaign databases
    Monthly(MonthlyArgs),
}

/// Arguments for the resample command
#[derive(Debug, Clone, Parser)]
pub struct ResampleArgs {
    /// Catalog URL whose last segment is the file name filter, e.g.
    /// `http://elvis.shore.mbari.org/thredds/catalog/LRAUV/daphne/missionlogs/2015/.*.nc4`
    #[arg(short = 'u', long = "in-url", alias = "inUrl", value_name = "URL")]
    pub in_url: Option<String>,

    /// Local mirror of the catalog's year directory
    #[arg(short = 'i', long = "in-dir", alias = "inDir", value_name = "DIR")]
    pub in_dir: Option<String>,

    /// Parameter profile, also appended to output names
    #[arg(
        short = 'a',
        long = "append-string",
        alias = "appendString",
        value_enum,
        default_value_t = Profile::Scieng
    )]
    pub profile: Profile,

    /// Resampling frequency, e.g. 2S, 5Min, H
    #[arg(
        short = 'r',
        long = "resample-freq",
        alias = "resampleFreq",
        default_value = DEFAULT_RESAMPLE_FREQ
    )]
    pub resample_freq: ResampleFrequency,

    /// JSON parameter map replacing the profile's built-in one
    #[arg(short = 'p', long = "parms", value_name = "JSON")]
    pub parms: Option<String>,

    /// Start of the window, YYYYMMDDTHHMMSS or YYYYMMDD
    #[arg(short = 's', long = "start", value_name = "DATE")]
    pub start: Option<String>,

    /// End of the window, YYYYMMDDTHHMMSS or YYYYMMDD
    #[arg(short = 'e', long = "end", value_name = "DATE")]
    pub end: Option<String>,

    /// Window covering the previous calendar month
    #[arg(
        long = "previous-month",
        alias = "previous_month",
        conflicts_with_all = ["start", "end", "current_month"]
    )]
    pub previous_month: bool,

    /// Window covering the current calendar month
    #[arg(
        long = "current-month",
        alias = "current_month",
        conflicts_with_all = ["start", "end"]
    )]
    pub current_month: bool,

    /// Use tracking database positions of `<platform>_ac`
    #[arg(long = "trackingdb")]
    pub trackingdb: bool,

    /// Nudge dead reckoned positions to the GPS fixes
    #[arg(long = "nudge")]
    pub nudge: bool,

    /// Platforms to process (comma-separated); all known platforms if omitted
    #[arg(long = "platform", value_delimiter = ',', value_name = "NAME")]
    pub platforms: Vec<String>,

    /// Crawl the local mirror instead of the catalog server
    #[arg(long = "offline")]
    pub offline: bool,

    /// Files resampled concurrently
    #[arg(short = 'j', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Warn about and skip mission group manifests with malformed names
    #[arg(long = "skip-malformed-groups")]
    pub skip_malformed_groups: bool,
}

impl ResampleArgs {
    /// Resolve the processing window
    pub fn window(&self, today: NaiveDate) -> Result<TimeWindow> {
        if self.previous_month {
            month_window(MonthSelector::Previous, today)
        } else if self.current_month {
            month_window(MonthSelector::Current, today)
        } else {
            resolve_window(self.start.as_deref(), self.end.as_deref())
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            use_tracking_db: self.trackingdb,
            nudge_to_gps: self.nudge,
        }
    }

    /// Check argument combinations clap can't express
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(LrauvError::configuration("--workers must be at least 1"));
        }
        if self.platforms.iter().any(|p| p.trim().is_empty()) {
            return Err(LrauvError::configuration("--platform has an empty name"));
        }
        if self.in_dir.is_some() && self.platforms.len() != 1 {
            return Err(LrauvError::configuration(
                "--in-dir names one platform's mirror; give exactly one --platform",
            ));
        }
        Ok(())
    }
}

/// Arguments for the monthly command
#[derive(Debug, Clone, Parser)]
#[command(group(
    ArgGroup::new("selection")
        .required(true)
        .args(["yyyymm", "start_yyyymm", "previous_month", "current_month"])
))]
pub struct MonthlyArgs {
    /// Month to load, e.g. 201906
    #[arg(long = "yyyymm", alias = "YYYYMM", value_name = "YYYYMM")]
    pub yyyymm: Option<YearMonth>,

    /// First month of a range, e.g. 201701
    #[arg(
        long = "start-yyyymm",
        alias = "start_YYYYMM",
        value_name = "YYYYMM",
        requires = "end_yyyymm"
    )]
    pub start_yyyymm: Option<YearMonth>,

    /// Last month of a range (inclusive), e.g. 201812
    #[arg(
        long = "end-yyyymm",
        alias = "end_YYYYMM",
        value_name = "YYYYMM",
        requires = "start_yyyymm"
    )]
    pub end_yyyymm: Option<YearMonth>,

    /// Load the previous calendar month
    #[arg(long = "previous-month", alias = "previous_month")]
    pub previous_month: bool,

    /// Load the current calendar month
    #[arg(long = "current-month", alias = "current_month")]
    pub current_month: bool,

    /// Load test databases
    #[arg(long = "test")]
    pub test: bool,

    /// Database name prefix
    #[arg(long = "db-prefix", value_name = "PREFIX")]
    pub db_prefix: Option<String>,
}

impl MonthlyArgs {
    pub fn selection(&self) -> Result<MonthSelection> {
        match (self.yyyymm, self.start_yyyymm, self.end_yyyymm) {
            (Some(month), _, _) => Ok(MonthSelection::Single(month)),
            (None, Some(start), Some(end)) => Ok(MonthSelection::Range { start, end }),
            _ if self.previous_month => Ok(MonthSelection::PreviousMonth),
            _ if self.current_month => Ok(MonthSelection::CurrentMonth),
            _ => Err(LrauvError::configuration(
                "Give --yyyymm, --start-yyyymm with --end-yyyymm, --previous-month or --current-month",
            )),
        }
    }
}
