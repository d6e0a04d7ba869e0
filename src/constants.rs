//! Application constants for the LRAUV processor
//!
//! Default locations, catalog patterns, naming conventions and exit codes
//! used throughout the processor.

// =============================================================================
// Platforms and Default Locations
// =============================================================================

/// LRAUV platforms processed when no `--platform` is given
pub const LRAUV_PLATFORMS: &[&str] = &[
    "ahi", "aku", "brizo", "daphne", "galene", "makai", "opah", "pontus", "tethys", "triton",
];

/// Default local mirror directory, templated on `{platform}` and `{year}`
pub const DEFAULT_MIRROR_TEMPLATE: &str = "/mbari/LRAUV/{platform}/missionlogs/{year}";

/// Default THREDDS catalog URL, templated on `{platform}` and `{year}`.
/// The last path segment is the file name filter.
pub const DEFAULT_CATALOG_TEMPLATE: &str =
    "http://elvis.shore.mbari.org/thredds/catalog/LRAUV/{platform}/missionlogs/{year}/.*.nc4";

/// Name of the THREDDS catalog document inside each directory
pub const CATALOG_DOCUMENT: &str = "catalog.xml";

// =============================================================================
// Catalog Crawling
// =============================================================================

/// Selects the mission group manifests at the top of a year catalog
pub const GROUP_MANIFEST_PATTERN: &str = ".*dlist";

/// Service type carrying remote array-data access URLs
pub const OPENDAP_SERVICE: &str = "opendap";

/// Skip patterns applied by the catalog crawler to every crawl
pub const CRAWLER_DEFAULT_SKIPS: &[&str] = &[
    ".*files.*",
    ".*Individual Files.*",
    ".*File_Access.*",
    ".*Forecast Model Run.*",
    ".*Constant Forecast Offset.*",
    ".*Constant Forecast Date.*",
];

/// Known-noise file names inside mission groups: transfer queue markers,
/// configuration and checksum files
pub const NOISE_SKIPS: &[&str] = &[
    ".*Courier.*",
    ".*Express.*",
    ".*Normal.*",
    ".*Priority.*",
    r".*\.cfg$",
    r".*\.md5$",
];

/// Number of trailing URL path segments mirrored below the input directory
pub const MIRROR_PATH_SEGMENTS: usize = 3;

/// Default HTTP timeout for catalog requests
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// Time Handling
// =============================================================================

/// Time coordinate written by the LRAUV nc4 converter
pub const DEFAULT_TIME_AXIS: &str = "time_time";

/// Accepted command line date-time format
pub const DATETIME_ARG_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Accepted command line date format
pub const DATE_ARG_FORMAT: &str = "%Y%m%d";

/// Mission group manifests encode their dates with this format
pub const GROUP_DATE_FORMAT: &str = "%Y%m%d";

/// Unix epoch units as the converter spells them in different versions
pub const EPOCH_UNIT_SPELLINGS: &[&str] = &[
    "seconds since 1970-01-01T00:00:00Z",
    "seconds since 1970/01/01 00:00:00Z",
];

/// Canonical spelling the units helper expects
pub const CANONICAL_EPOCH_UNITS: &str = "seconds since 1970-01-01 00:00:00";

// =============================================================================
// Resampling
// =============================================================================

/// Default resampling frequency
pub const DEFAULT_RESAMPLE_FREQ: &str = "2S";

/// Suffix of resampled output files
pub const OUTPUT_SUFFIX: &str = "nc";

/// Suffix of per-file failure logs read by the audit script
pub const FAILURE_LOG_SUFFIX: &str = "log";

/// Default interpolator program
pub const DEFAULT_TRANSFORM_PROGRAM: &str = "lrauvNc4ToNetcdf.py";

/// Exit codes of the interpolator program
pub mod transform_exit {
    pub const TYPE_MISMATCH: i32 = 3;
    pub const INDEX_OUT_OF_RANGE: i32 = 4;
    pub const MISSING_KEY: i32 = 5;
}

// =============================================================================
// Monthly Load
// =============================================================================

/// Database name prefix for monthly campaigns
pub const DEFAULT_DB_PREFIX: &str = "stoqs_lrauv_";

/// Default loader program
pub const DEFAULT_LOADER_PROGRAM: &str = "stoqs/loaders/load.py";

/// Default load script generator
pub const DEFAULT_SCRIPT_MAKER_PROGRAM: &str = "stoqs/loaders/LRAUV/make_load_scripts.py";

// =============================================================================
// Configuration
// =============================================================================

/// Directory below the user config dir holding `config.json`
pub const CONFIG_DIR_NAME: &str = "lrauv-processor";

/// Config file name
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Environment overrides
pub mod env {
    pub const MIRROR_TEMPLATE: &str = "LRAUV_MIRROR_TEMPLATE";
    pub const CATALOG_TEMPLATE: &str = "LRAUV_CATALOG_TEMPLATE";
    pub const TRANSFORM_PROGRAM: &str = "LRAUV_TRANSFORM_PROGRAM";
    pub const LOADER_PROGRAM: &str = "LRAUV_LOADER_PROGRAM";
}
