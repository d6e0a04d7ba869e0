//! Monthly batch loading.
//!
//! Turns a month selection into campaign database loads. For every year
//! covered, load scripts are generated and their campaigns registered once;
//! then each month is loaded, its provenance updated and the database
//! dumped, strictly in calendar order.

pub mod command;

use crate::constants::DEFAULT_DB_PREFIX;
use crate::error::{LrauvError, Result};
use chrono::{Datelike, Months, NaiveDate};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use command::CommandLoadPipeline;

/// A calendar month, written `YYYYMM` on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(LrauvError::configuration(format!(
                "Month {} of {} is out of range",
                month, year
            )));
        }
        Ok(Self { year, month })
    }

    /// Month containing a date
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    /// The following month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Campaign database name, e.g. `stoqs_lrauv_sep2019`
    pub fn db_name(&self, prefix: &str) -> String {
        let monyyyy = self
            .first_day()
            .map(|d| d.format("%b%Y").to_string().to_lowercase())
            .unwrap_or_default();
        format!("{}{}", prefix, monyyyy)
    }
}

impl FromStr for YearMonth {
    type Err = LrauvError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || LrauvError::configuration(format!("Expected YYYYMM, got '{}'", s));
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = s[..4].parse().map_err(|_| invalid())?;
        let month = s[4..].parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Which months to load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthSelection {
    Single(YearMonth),
    /// Both ends inclusive
    Range { start: YearMonth, end: YearMonth },
    PreviousMonth,
    CurrentMonth,
}

impl MonthSelection {
    /// Months selected relative to `today`, in calendar order
    pub fn months(&self, today: NaiveDate) -> Result<Vec<YearMonth>> {
        match *self {
            MonthSelection::Single(month) => Ok(vec![month]),
            MonthSelection::Range { start, end } => {
                if start > end {
                    return Err(LrauvError::configuration(format!(
                        "Start month {} is after end month {}",
                        start, end
                    )));
                }
                let mut months = vec![start];
                let mut current = start;
                while current < end {
                    current = current.succ();
                    months.push(current);
                }
                Ok(months)
            }
            MonthSelection::PreviousMonth => today
                .checked_sub_months(Months::new(1))
                .map(|d| vec![YearMonth::of(d)])
                .ok_or_else(|| {
                    LrauvError::configuration(format!("No month before {}", today))
                }),
            MonthSelection::CurrentMonth => Ok(vec![YearMonth::of(today)]),
        }
    }
}

/// Steps of the external load pipeline
pub trait LoadPipeline {
    /// Generate the year's load scripts; returns the campaign databases
    fn generate_load_scripts(&self, year: i32) -> impl Future<Output = Result<Vec<String>>>;

    fn register_campaigns(&self, campaigns: &[String]) -> impl Future<Output = Result<()>>;

    /// Recreate and load a campaign database
    fn load(&self, db: &str) -> impl Future<Output = Result<()>>;

    fn update_provenance(&self, db: &str) -> impl Future<Output = Result<()>>;

    fn dump(&self, db: &str) -> impl Future<Output = Result<()>>;
}

/// What a monthly run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlyReport {
    pub years: Vec<i32>,
    pub loaded: Vec<String>,
    /// Database name and error message of every failed month
    pub failed: Vec<(String, String)>,
    pub interrupted: bool,
}

impl MonthlyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.interrupted
    }
}

/// Run a step unless the run is cancelled first. On cancellation the
/// step's future is dropped, which kills any program it was running.
async fn until_cancelled<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T>>,
) -> Option<Result<T>> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        result = step => Some(result),
    }
}

/// Sequences the load pipeline over selected months
#[derive(Debug)]
pub struct MonthlyDriver<P> {
    pipeline: P,
    db_prefix: String,
}

impl<P: LoadPipeline> MonthlyDriver<P> {
    pub fn new(pipeline: P) -> Self {
        Self {
            pipeline,
            db_prefix: DEFAULT_DB_PREFIX.to_string(),
        }
    }

    pub fn with_db_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.db_prefix = prefix.into();
        self
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    async fn load_month(&self, db: &str) -> Result<()> {
        info!("Loading {}", db);
        self.pipeline.load(db).await?;
        info!("Updating provenance of {}", db);
        self.pipeline.update_provenance(db).await?;
        info!("Dumping {}", db);
        self.pipeline.dump(db).await
    }

    /// Run the pipeline over every selected month.
    ///
    /// A failing year-level step aborts the run; a failing month is recorded
    /// and the next month proceeds. Cancelling stops the step in progress.
    pub async fn run(
        &self,
        selection: MonthSelection,
        today: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<MonthlyReport> {
        let months = selection.months(today)?;
        let mut report = MonthlyReport::default();

        for month in months {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }

            if report.years.last() != Some(&month.year) {
                info!("Generating load scripts for {}", month.year);
                let year_steps = async {
                    let campaigns = self.pipeline.generate_load_scripts(month.year).await?;
                    self.pipeline.register_campaigns(&campaigns).await
                };
                let Some(result) = until_cancelled(cancel, year_steps).await else {
                    warn!("Interrupted while preparing {}", month.year);
                    report.interrupted = true;
                    break;
                };
                result?;
                report.years.push(month.year);
            }

            let db = month.db_name(&self.db_prefix);
            match until_cancelled(cancel, self.load_month(&db)).await {
                Some(Ok(())) => report.loaded.push(db),
                Some(Err(e)) => {
                    error!("Loading {} failed: {}", db, e);
                    report.failed.push((db, e.to_string()));
                }
                None => {
                    warn!("Interrupted while loading {}", db);
                    report.interrupted = true;
                    break;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPipeline {
        calls: Mutex<Vec<String>>,
        failing_dbs: HashSet<String>,
        failing_years: HashSet<i32>,
        /// Databases whose load never finishes
        stuck_dbs: HashSet<String>,
    }

    impl RecordingPipeline {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl LoadPipeline for RecordingPipeline {
        async fn generate_load_scripts(&self, year: i32) -> Result<Vec<String>> {
            self.record(format!("generate {}", year));
            if self.failing_years.contains(&year) {
                return Err(LrauvError::configuration("script maker missing"));
            }
            Ok(vec![format!("stoqs_lrauv_{}", year)])
        }

        async fn register_campaigns(&self, campaigns: &[String]) -> Result<()> {
            self.record(format!("register {}", campaigns.join(",")));
            Ok(())
        }

        async fn load(&self, db: &str) -> Result<()> {
            self.record(format!("load {}", db));
            if self.stuck_dbs.contains(db) {
                std::future::pending::<()>().await;
            }
            if self.failing_dbs.contains(db) {
                return Err(LrauvError::configuration("load failed"));
            }
            Ok(())
        }

        async fn update_provenance(&self, db: &str) -> Result<()> {
            self.record(format!("provenance {}", db));
            Ok(())
        }

        async fn dump(&self, db: &str) -> Result<()> {
            self.record(format!("dump {}", db));
            Ok(())
        }
    }

    fn ym(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 9, 24).unwrap()
    }

    #[test]
    fn test_year_month_parsing() {
        assert_eq!(ym("201906"), YearMonth { year: 2019, month: 6 });
        for bad in ["2019", "201913", "201900", "2019-6", "20190601", "abcdef"] {
            assert!(bad.parse::<YearMonth>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_db_name() {
        assert_eq!(ym("201909").db_name(DEFAULT_DB_PREFIX), "stoqs_lrauv_sep2019");
        assert_eq!(ym("201701").db_name("test_"), "test_jan2017");
    }

    #[test]
    fn test_range_is_inclusive_and_crosses_years() {
        let months = MonthSelection::Range {
            start: ym("201711"),
            end: ym("201802"),
        }
        .months(today())
        .unwrap();
        let names: Vec<String> = months.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["201711", "201712", "201801", "201802"]);

        let reversed = MonthSelection::Range {
            start: ym("201802"),
            end: ym("201711"),
        };
        assert!(reversed.months(today()).is_err());
    }

    #[test]
    fn test_relative_months() {
        assert_eq!(MonthSelection::PreviousMonth.months(today()).unwrap(), vec![ym("201908")]);
        assert_eq!(MonthSelection::CurrentMonth.months(today()).unwrap(), vec![ym("201909")]);

        let january = NaiveDate::from_ymd_opt(2020, 1, 31).unwrap();
        assert_eq!(MonthSelection::PreviousMonth.months(january).unwrap(), vec![ym("201912")]);
    }

    #[tokio::test]
    async fn test_steps_run_in_order_with_scripts_once_per_year() {
        let driver = MonthlyDriver::new(RecordingPipeline::default());
        let selection = MonthSelection::Range {
            start: ym("201812"),
            end: ym("201901"),
        };

        let report = driver
            .run(selection, today(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            driver.pipeline().calls(),
            vec![
                "generate 2018",
                "register stoqs_lrauv_2018",
                "load stoqs_lrauv_dec2018",
                "provenance stoqs_lrauv_dec2018",
                "dump stoqs_lrauv_dec2018",
                "generate 2019",
                "register stoqs_lrauv_2019",
                "load stoqs_lrauv_jan2019",
                "provenance stoqs_lrauv_jan2019",
                "dump stoqs_lrauv_jan2019",
            ]
        );
        assert_eq!(report.years, vec![2018, 2019]);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_failed_month_does_not_stop_the_next() {
        let pipeline = RecordingPipeline {
            failing_dbs: HashSet::from(["stoqs_lrauv_feb2019".to_string()]),
            ..Default::default()
        };
        let driver = MonthlyDriver::new(pipeline);
        let selection = MonthSelection::Range {
            start: ym("201901"),
            end: ym("201903"),
        };

        let report = driver
            .run(selection, today(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.loaded, vec!["stoqs_lrauv_jan2019", "stoqs_lrauv_mar2019"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "stoqs_lrauv_feb2019");
        assert!(!report.is_success());
        assert!(!driver
            .pipeline()
            .calls()
            .contains(&"provenance stoqs_lrauv_feb2019".to_string()));
    }

    #[tokio::test]
    async fn test_failed_year_step_aborts() {
        let pipeline = RecordingPipeline {
            failing_years: HashSet::from([2019]),
            ..Default::default()
        };
        let driver = MonthlyDriver::new(pipeline);

        let result = driver
            .run(MonthSelection::Single(ym("201906")), today(), &CancellationToken::new())
            .await;

        assert!(result.is_err());
        assert_eq!(driver.pipeline().calls(), vec!["generate 2019"]);
    }

    #[tokio::test]
    async fn test_cancel_stops_a_running_load() {
        let pipeline = RecordingPipeline {
            stuck_dbs: HashSet::from(["stoqs_lrauv_jun2019".to_string()]),
            ..Default::default()
        };
        let driver = MonthlyDriver::new(pipeline);
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let selection = MonthSelection::Range {
            start: ym("201906"),
            end: ym("201907"),
        };
        let run = driver.run(selection, today(), &cancel);
        let report = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run should stop once cancelled")
            .unwrap();

        assert!(report.interrupted);
        assert!(!report.is_success());
        assert!(report.loaded.is_empty());
        assert!(report.failed.is_empty());
        assert_eq!(
            driver.pipeline().calls(),
            vec!["generate 2019", "register stoqs_lrauv_2019", "load stoqs_lrauv_jun2019"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let driver = MonthlyDriver::new(RecordingPipeline::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = driver
            .run(MonthSelection::Single(ym("201906")), today(), &cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert!(driver.pipeline().calls().is_empty());
    }
}
