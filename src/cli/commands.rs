//! Command implementations for the LRAUV processor CLI
//!
//! Sets up logging and layered configuration, wires the collaborators for
//! the chosen subcommand and prints the run summary.

use crate::catalog::{
    CatalogClient, CatalogCrawler, MalformedGroupPolicy, MirrorCatalog, ThreddsClient,
};
use crate::cli::args::{Args, Commands, MonthlyArgs, ResampleArgs};
use crate::config::ProcessorConfig;
use crate::error::{LrauvError, Result};
use crate::models::ProcessingStats;
use crate::monthly::{CommandLoadPipeline, MonthlyDriver, MonthlyReport};
use crate::parameters;
use crate::pipeline::{PlatformReport, ResampleSettings};
use crate::processor::transform::ExternalCommandTransform;
use crate::processor::{OutputNaming, ResampleOrchestrator};
use chrono::{Local, NaiveDate};
use colored::*;
use indicatif::HumanDuration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Run the selected subcommand.
///
/// Returns whether the run succeeded; per-file failures alone don't make a
/// resample run unsuccessful.
pub async fn run(args: Args, cancel: CancellationToken) -> Result<bool> {
    setup_logging(&args)?;
    debug!("Command line arguments: {:?}", args);

    let today = Local::now().date_naive();
    match &args.command {
        Some(Commands::Resample(resample)) => {
            resample.validate()?;
            let config = load_configuration(&args, Some(resample))?;
            run_resample(&args, resample, config, today, &cancel).await
        }
        Some(Commands::Monthly(monthly)) => {
            let config = load_configuration(&args, None)?;
            run_monthly(&args, monthly, config, today, &cancel).await
        }
        None => Err(LrauvError::configuration("No subcommand given")),
    }
}

/// Set up structured logging based on CLI arguments
fn setup_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.get_log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lrauv_processor={}", log_level)));

    let result = if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| LrauvError::configuration(format!("Can't initialise logging: {}", e)))?;

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Load configuration using the layered approach (file -> env -> args)
fn load_configuration(args: &Args, resample: Option<&ResampleArgs>) -> Result<ProcessorConfig> {
    let mut config = ProcessorConfig::load(args.config_file.as_deref())?;
    config.apply_env();

    if let Some(resample) = resample {
        if let Some(workers) = resample.workers {
            config.transform.workers = workers;
        }
        if !resample.platforms.is_empty() {
            config.platforms = resample.platforms.clone();
        }
        if resample.skip_malformed_groups {
            config.catalog.malformed_groups = MalformedGroupPolicy::SkipWithWarning;
        }
    }

    config.validate()?;
    debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

async fn run_resample(
    args: &Args,
    resample: &ResampleArgs,
    config: ProcessorConfig,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> Result<bool> {
    // Everything that can be rejected is rejected before any network access
    let window = resample.window(today)?;
    let parameters = parameters::resolve(resample.profile, resample.parms.as_deref())?;
    info!(
        "Resampling {} variables from {} instruments at {} within {}",
        parameters.variable_count(),
        parameters.len(),
        resample.resample_freq,
        window
    );

    let naming = OutputNaming::new(resample.resample_freq.clone(), resample.profile);
    let orchestrator = ResampleOrchestrator::new(
        ExternalCommandTransform::new(config.transform.program_spec()),
        naming,
    )
    .with_options(resample.run_options())
    .with_workers(config.transform.workers)
    .with_progress(args.show_progress());

    let settings = ResampleSettings {
        platforms: config.platforms.clone(),
        window,
        input_dir: resample.in_dir.clone(),
        catalog_url: resample.in_url.clone(),
        templates: config.input_templates(),
        today,
        offline: resample.offline,
        time_axis: config.mirror.time_axis.clone(),
        validation_workers: config.mirror.validation_workers,
        write_failure_logs: config.mirror.write_failure_logs,
    };

    let (stats, reports) = if resample.offline {
        let crawler = build_crawler(MirrorCatalog::new(), &config)?;
        execute(crawler, orchestrator, settings, &parameters, cancel).await?
    } else {
        let client = ThreddsClient::with_timeout(config.catalog_timeout())?;
        let crawler = build_crawler(client, &config)?;
        execute(crawler, orchestrator, settings, &parameters, cancel).await?
    };

    print_resample_summary(&stats, &reports);
    Ok(stats.is_success())
}

fn build_crawler<C: CatalogClient>(
    client: C,
    config: &ProcessorConfig,
) -> Result<CatalogCrawler<C>> {
    Ok(CatalogCrawler::new(client)
        .with_extra_skips(&config.catalog.extra_skips)?
        .with_malformed_policy(config.catalog.malformed_groups))
}

#[cfg(feature = "netcdf")]
async fn execute<C: CatalogClient>(
    crawler: CatalogCrawler<C>,
    orchestrator: ResampleOrchestrator<ExternalCommandTransform>,
    settings: ResampleSettings,
    parameters: &parameters::ParameterMap,
    cancel: &CancellationToken,
) -> Result<(ProcessingStats, Vec<PlatformReport>)> {
    let pipeline = crate::pipeline::ResamplePipeline::new(
        crawler,
        crate::reader::NetCdfReader,
        orchestrator,
        settings,
    );
    pipeline.run(parameters, cancel).await
}

#[cfg(not(feature = "netcdf"))]
async fn execute<C: CatalogClient>(
    _crawler: CatalogCrawler<C>,
    _orchestrator: ResampleOrchestrator<ExternalCommandTransform>,
    _settings: ResampleSettings,
    _parameters: &parameters::ParameterMap,
    _cancel: &CancellationToken,
) -> Result<(ProcessingStats, Vec<PlatformReport>)> {
    Err(LrauvError::configuration(
        "Built without the netcdf feature; mission logs can't be read",
    ))
}

async fn run_monthly(
    args: &Args,
    monthly: &MonthlyArgs,
    config: ProcessorConfig,
    today: NaiveDate,
    cancel: &CancellationToken,
) -> Result<bool> {
    let selection = monthly.selection()?;
    let db_prefix = monthly
        .db_prefix
        .clone()
        .unwrap_or_else(|| config.monthly.db_prefix.clone());

    let pipeline = CommandLoadPipeline::new(
        config.monthly.loader_spec(),
        config.monthly.script_maker_spec(),
    )
    .with_db_prefix(&db_prefix)
    .with_test(monthly.test)
    .with_verbosity(args.verbose);
    let driver = MonthlyDriver::new(pipeline).with_db_prefix(db_prefix);

    let report = driver.run(selection, today, cancel).await?;
    print_monthly_summary(&report);
    Ok(report.is_success())
}

fn print_resample_summary(stats: &ProcessingStats, reports: &[PlatformReport]) {
    println!("\n{}", "Resampling Summary".bright_green().bold());
    for report in reports {
        println!(
            "  {} {} discovered, {} in window, {} produced, {} skipped, {} failed",
            format!("{}:", report.inputs.platform).bright_cyan(),
            report.discovered,
            report.validated,
            report.resample.produced.len(),
            report.resample.skipped.len(),
            report.failures.len()
        );
    }
    println!(
        "  {} {}",
        "Time elapsed:".bright_cyan(),
        HumanDuration(stats.processing_time).to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Files produced:".bright_cyan(),
        stats.files_produced.to_string().bright_white().bold()
    );
    println!(
        "  {} {}",
        "Already resampled:".bright_cyan(),
        stats.files_skipped.to_string().bright_white()
    );
    if stats.total_failures() > 0 {
        println!(
            "  {} {} ({} unreadable, {} failed to resample)",
            "Files failed:".bright_red(),
            stats.total_failures().to_string().bright_red().bold(),
            stats.validation_failures,
            stats.files_failed
        );
    }
    if stats.groups_unreachable > 0 {
        println!(
            "  {} {}",
            "Mission groups unreachable:".bright_yellow(),
            stats.groups_unreachable.to_string().bright_yellow().bold()
        );
    }
    if stats.platforms_failed > 0 {
        println!(
            "  {} {}",
            "Platforms failed:".bright_red(),
            stats.platforms_failed.to_string().bright_red().bold()
        );
    }
    if stats.interrupted {
        println!("  {}", "Interrupted before all files were scheduled".bright_yellow());
    }
}

fn print_monthly_summary(report: &MonthlyReport) {
    println!("\n{}", "Monthly Load Summary".bright_green().bold());
    for db in &report.loaded {
        println!("  {} {}", "Loaded".bright_cyan(), db.bright_white());
    }
    for (db, message) in &report.failed {
        println!("  {} {}: {}", "Failed".bright_red(), db.bright_red().bold(), message);
    }
    if report.interrupted {
        println!("  {}", "Interrupted".bright_yellow());
    }
}
