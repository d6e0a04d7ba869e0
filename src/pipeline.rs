//! Per-platform resample pipeline.
//!
//! For each platform: resolve inputs, crawl the catalog, validate the
//! candidates against the mirror and resample the survivors. A platform
//! whose catalog can't be crawled is counted and skipped; only
//! configuration errors end the run.

use crate::catalog::{CatalogClient, CatalogCrawler};
use crate::error::{LrauvError, Result};
use crate::failure_log::{FailureLog, FailureRecord};
use crate::models::{ProcessingStats, TimeWindow};
use crate::parameters::ParameterMap;
use crate::processor::{ResampleOrchestrator, ResampleReport};
use crate::processor::transform::ResampleTransform;
use crate::reader::TimeAxisReader;
use crate::validator::CandidateValidator;
use crate::window::{InputTemplates, PlatformInputs, resolve_inputs};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything a resample run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ResampleSettings {
    pub platforms: Vec<String>,
    pub window: TimeWindow,
    /// Explicit mirror directory, replacing the templated default
    pub input_dir: Option<String>,
    /// Explicit catalog URL with file filter, replacing the templated default
    pub catalog_url: Option<String>,
    pub templates: InputTemplates,
    pub today: NaiveDate,
    /// Crawl the mirror directory instead of the catalog server
    pub offline: bool,
    pub time_axis: String,
    pub validation_workers: usize,
    pub write_failure_logs: bool,
}

/// Outcome of one platform
#[derive(Debug, Clone)]
pub struct PlatformReport {
    pub inputs: PlatformInputs,
    pub discovered: usize,
    /// Catalog URLs of mission groups that couldn't be crawled
    pub unreachable_groups: Vec<String>,
    pub validated: usize,
    pub failures: Vec<FailureRecord>,
    pub resample: ResampleReport,
}

/// Runs discovery, validation and resampling across platforms
pub struct ResamplePipeline<C, R, T> {
    crawler: CatalogCrawler<C>,
    reader: Arc<R>,
    orchestrator: ResampleOrchestrator<T>,
    settings: ResampleSettings,
}

impl<C, R, T> ResamplePipeline<C, R, T>
where
    C: CatalogClient,
    R: TimeAxisReader,
    T: ResampleTransform,
{
    pub fn new(
        crawler: CatalogCrawler<C>,
        reader: R,
        orchestrator: ResampleOrchestrator<T>,
        settings: ResampleSettings,
    ) -> Self {
        Self {
            crawler,
            reader: Arc::new(reader),
            orchestrator,
            settings,
        }
    }

    /// Resolve the inputs of every platform up front so configuration
    /// errors surface before any network access
    pub fn resolve_all(&self) -> Result<Vec<PlatformInputs>> {
        self.settings
            .platforms
            .iter()
            .map(|platform| {
                resolve_inputs(
                    platform,
                    &self.settings.window,
                    self.settings.input_dir.as_deref(),
                    self.settings.catalog_url.as_deref(),
                    &self.settings.templates,
                    self.settings.today,
                )
            })
            .collect()
    }

    /// Process one platform
    pub async fn run_platform(
        &self,
        inputs: PlatformInputs,
        parameters: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<PlatformReport> {
        let catalog_base = if self.settings.offline {
            inputs.input_dir.to_string_lossy().to_string()
        } else {
            inputs.catalog_base.clone()
        };
        info!(
            "Processing {} from {} into {}",
            inputs.platform,
            catalog_base,
            inputs.input_dir.display()
        );

        let discovery = self
            .crawler
            .discover(&catalog_base, &inputs.file_filter, &self.settings.window)
            .await?;
        let refs = discovery.refs;
        info!("{}: discovered {} logs", inputs.platform, refs.len());
        if !discovery.unreachable_groups.is_empty() {
            warn!(
                "{}: {} mission groups couldn't be crawled",
                inputs.platform,
                discovery.unreachable_groups.len()
            );
        }

        let mut failures = FailureLog::new(&inputs.input_dir, self.orchestrator.naming().clone());
        if !self.settings.write_failure_logs {
            failures = failures.without_files();
        }

        let validator = CandidateValidator::shared(Arc::clone(&self.reader), &inputs.input_dir)
            .with_time_axis(&self.settings.time_axis)
            .with_concurrency(self.settings.validation_workers);
        let validated = validator
            .validate(&refs, &self.settings.window, &mut failures)
            .await;
        info!("{}: {} logs inside {}", inputs.platform, validated.len(), self.settings.window);

        let resample = self
            .orchestrator
            .run(&validated, parameters, &mut failures, cancel)
            .await;

        Ok(PlatformReport {
            discovered: refs.len(),
            unreachable_groups: discovery.unreachable_groups,
            validated: validated.len(),
            failures: failures.into_records(),
            resample,
            inputs,
        })
    }

    /// Process every configured platform
    pub async fn run(
        &self,
        parameters: &ParameterMap,
        cancel: &CancellationToken,
    ) -> Result<(ProcessingStats, Vec<PlatformReport>)> {
        let start_time = Instant::now();
        let all_inputs = self.resolve_all()?;
        let mut stats = ProcessingStats::default();
        let mut reports = Vec::new();

        for inputs in all_inputs {
            if cancel.is_cancelled() {
                warn!("Interrupted before {}", inputs.platform);
                stats.interrupted = true;
                break;
            }

            let platform = inputs.platform.clone();
            match self.run_platform(inputs, parameters, cancel).await {
                Ok(report) => {
                    stats.platforms_processed += 1;
                    stats.datasets_discovered += report.discovered;
                    stats.groups_unreachable += report.unreachable_groups.len();
                    stats.files_validated += report.validated;
                    stats.validation_failures +=
                        report.failures.iter().filter(|r| r.kind.is_validation()).count();
                    stats.files_produced += report.resample.produced.len();
                    stats.files_skipped += report.resample.skipped.len();
                    stats.files_failed += report.resample.failed.len();
                    stats.interrupted |= report.resample.interrupted;
                    reports.push(report);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("Can't process {}: {}", platform, e);
                    stats.platforms_failed += 1;
                    if matches!(e, LrauvError::CrawlDefect { .. }) {
                        stats.crawl_defects += 1;
                    }
                }
            }
        }

        stats.processing_time = start_time.elapsed();
        Ok((stats, reports))
    }
}
