//! Time-window and input resolution.
//!
//! Turns command line date strings and month conveniences into a
//! [`TimeWindow`], and templates the default mirror directory and catalog
//! URL for each platform.

use crate::constants::{DATE_ARG_FORMAT, DATETIME_ARG_FORMAT};
use crate::error::{LrauvError, Result};
use crate::models::{TimeWindow, midnight};
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// Relative month conveniences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSelector {
    Previous,
    Current,
}

/// Parse `YYYYMMDDTHHMMSS` or `YYYYMMDD` into an instant
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, DATETIME_ARG_FORMAT) {
        return Ok(naive.and_utc());
    }
    NaiveDate::parse_from_str(value, DATE_ARG_FORMAT)
        .map(midnight)
        .map_err(|_| {
            LrauvError::configuration(format!(
                "Can't parse date '{}': expected YYYYMMDDTHHMMSS or YYYYMMDD",
                value
            ))
        })
}

/// Resolve optional start/end strings into a window
pub fn resolve_window(start: Option<&str>, end: Option<&str>) -> Result<TimeWindow> {
    let start = start.map(parse_instant).transpose()?;
    let end = end.map(parse_instant).transpose()?;
    TimeWindow::new(start, end)
}

/// Window covering the previous or current calendar month of `today`
pub fn month_window(selector: MonthSelector, today: NaiveDate) -> Result<TimeWindow> {
    let first_of_month = today.with_day(1).ok_or_else(|| {
        LrauvError::configuration(format!("Can't take first day of month of {}", today))
    })?;
    let (start, end) = match selector {
        MonthSelector::Previous => (
            first_of_month.checked_sub_months(Months::new(1)),
            Some(first_of_month),
        ),
        MonthSelector::Current => (
            Some(first_of_month),
            first_of_month.checked_add_months(Months::new(1)),
        ),
    };
    match (start, end) {
        (Some(start), Some(end)) => TimeWindow::new(Some(midnight(start)), Some(midnight(end))),
        _ => Err(LrauvError::configuration(format!(
            "Month window around {} is out of range",
            today
        ))),
    }
}

/// Templates for the per-platform defaults
#[derive(Debug, Clone)]
pub struct InputTemplates {
    pub mirror_dir: String,
    pub catalog_url: String,
}

/// Resolved inputs for one platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInputs {
    pub platform: String,
    /// Root of the local mirror of the catalog's year directory
    pub input_dir: PathBuf,
    /// Catalog URL without the file filter
    pub catalog_base: String,
    /// Regular expression selecting raw log names
    pub file_filter: String,
}

/// Resolve the mirror directory and catalog for a platform.
///
/// Explicit values replace the templated defaults verbatim.
pub fn resolve_inputs(
    platform: &str,
    window: &TimeWindow,
    input_dir: Option<&str>,
    catalog_url: Option<&str>,
    templates: &InputTemplates,
    today: NaiveDate,
) -> Result<PlatformInputs> {
    let year = window.template_year().unwrap_or_else(|| today.year());
    let fill = |template: &str| {
        template
            .replace("{platform}", platform)
            .replace("{year}", &year.to_string())
    };

    let input_dir = input_dir
        .map(str::to_string)
        .unwrap_or_else(|| fill(&templates.mirror_dir));
    let catalog_url = catalog_url
        .map(str::to_string)
        .unwrap_or_else(|| fill(&templates.catalog_url));

    let (catalog_base, file_filter) = catalog_url.rsplit_once('/').ok_or_else(|| {
        LrauvError::configuration(format!(
            "Catalog URL '{}' has no file filter segment",
            catalog_url
        ))
    })?;
    if file_filter.is_empty() {
        return Err(LrauvError::configuration(format!(
            "Catalog URL '{}' ends without a file filter",
            catalog_url
        )));
    }
    regex::Regex::new(file_filter).map_err(|e| {
        LrauvError::configuration(format!("Invalid file filter '{}': {}", file_filter, e))
    })?;

    debug!(
        "Resolved inputs for {}: dir={}, catalog={}, filter={}",
        platform, input_dir, catalog_base, file_filter
    );

    Ok(PlatformInputs {
        platform: platform.to_string(),
        input_dir: PathBuf::from(input_dir),
        catalog_base: catalog_base.to_string(),
        file_filter: file_filter.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{DEFAULT_CATALOG_TEMPLATE, DEFAULT_MIRROR_TEMPLATE};
    use chrono::TimeZone;

    fn templates() -> InputTemplates {
        InputTemplates {
            mirror_dir: DEFAULT_MIRROR_TEMPLATE.to_string(),
            catalog_url: DEFAULT_CATALOG_TEMPLATE.to_string(),
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 9, 24).unwrap()
    }

    #[test]
    fn test_parse_both_formats() {
        assert_eq!(
            parse_instant("20120901").unwrap(),
            Utc.with_ymd_and_hms(2012, 9, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_instant("20150930T123456").unwrap(),
            Utc.with_ymd_and_hms(2015, 9, 30, 12, 34, 56).unwrap()
        );
    }

    #[test]
    fn test_unparseable_date_is_configuration_error() {
        for bad in ["2012-09-01", "201209", "20121301", "tomorrow"] {
            assert!(
                matches!(parse_instant(bad), Err(LrauvError::Configuration { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_window_bounds_optional() {
        let window = resolve_window(Some("20120901"), None).unwrap();
        assert!(window.start.is_some());
        assert!(window.end.is_none());

        assert!(resolve_window(Some("20121001"), Some("20120901")).is_err());
    }

    #[test]
    fn test_month_windows() {
        let previous = month_window(MonthSelector::Previous, today()).unwrap();
        assert_eq!(previous.start, Some(Utc.with_ymd_and_hms(2019, 8, 1, 0, 0, 0).unwrap()));
        assert_eq!(previous.end, Some(Utc.with_ymd_and_hms(2019, 9, 1, 0, 0, 0).unwrap()));

        let january = NaiveDate::from_ymd_opt(2020, 1, 15).unwrap();
        let previous = month_window(MonthSelector::Previous, january).unwrap();
        assert_eq!(previous.start, Some(Utc.with_ymd_and_hms(2019, 12, 1, 0, 0, 0).unwrap()));

        let december = NaiveDate::from_ymd_opt(2019, 12, 31).unwrap();
        let current = month_window(MonthSelector::Current, december).unwrap();
        assert_eq!(current.start, Some(Utc.with_ymd_and_hms(2019, 12, 1, 0, 0, 0).unwrap()));
        assert_eq!(current.end, Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_templated_defaults_use_start_year() {
        let window = resolve_window(Some("20120901"), Some("20121001")).unwrap();
        let inputs = resolve_inputs("tethys", &window, None, None, &templates(), today()).unwrap();

        assert_eq!(inputs.input_dir, PathBuf::from("/mbari/LRAUV/tethys/missionlogs/2012"));
        assert_eq!(
            inputs.catalog_base,
            "http://elvis.shore.mbari.org/thredds/catalog/LRAUV/tethys/missionlogs/2012"
        );
        assert_eq!(inputs.file_filter, ".*.nc4");
    }

    #[test]
    fn test_explicit_inputs_override_verbatim() {
        let window = TimeWindow::unbounded();
        let inputs = resolve_inputs(
            "daphne",
            &window,
            Some("/data/daphne/2015/"),
            Some("http://example.org/thredds/catalog/daphne/2015/.*_sci.nc4$"),
            &templates(),
            today(),
        )
        .unwrap();

        assert_eq!(inputs.input_dir, PathBuf::from("/data/daphne/2015/"));
        assert_eq!(inputs.catalog_base, "http://example.org/thredds/catalog/daphne/2015");
        assert_eq!(inputs.file_filter, ".*_sci.nc4$");
    }

    #[test]
    fn test_unbounded_window_templates_current_year() {
        let inputs =
            resolve_inputs("makai", &TimeWindow::unbounded(), None, None, &templates(), today())
                .unwrap();
        assert_eq!(inputs.input_dir, PathBuf::from("/mbari/LRAUV/makai/missionlogs/2019"));
    }

    #[test]
    fn test_invalid_file_filter_rejected() {
        let result = resolve_inputs(
            "tethys",
            &TimeWindow::unbounded(),
            None,
            Some("http://example.org/catalog/(unclosed"),
            &templates(),
            today(),
        );
        assert!(matches!(result, Err(LrauvError::Configuration { .. })));
    }
}
