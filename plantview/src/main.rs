mod config;

use clap::{Parser, Subcommand};
use config::{CommonConfig, Config, LogFormat, LoggingConfig, MetricsConfig, Section};
use metrics_exporter_statsd::StatsdBuilder;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const METRICS_PREFIX: &str = "plantview";

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serves the plant list and device configuration APIs.
    Plants {
        /// YAML config file. Settings are read from the environment when omitted.
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
    /// Reads gauge values from the images announced by an S3 event notification.
    Recognize {
        /// YAML config file. Settings are read from the environment when omitted.
        #[arg(long)]
        config_file: Option<PathBuf>,
        /// JSON file holding the S3 event notification.
        #[arg(long)]
        event_file: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("missing `{0}` section in config")]
    MissingSection(&'static str),
    #[error("invalid sentry dsn: {0}")]
    SentryDsn(String),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("could not read event {}: {reason}", path.display())]
    Event { path: PathBuf, reason: String },
    #[error(transparent)]
    Plants(#[from] plants::PlantsRunError),
    #[error(transparent)]
    Recognition(#[from] recognition::RecognitionRunError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        CliCommand::Plants { config_file } => run_plants(config_file.as_deref()),
        CliCommand::Recognize {
            config_file,
            event_file,
        } => run_recognize(config_file.as_deref(), event_file),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exiting");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(config_file: Option<&Path>, section: Section) -> Result<Config, CliError> {
    let config = match config_file {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(section)?,
    };
    Ok(config)
}

/// Sets up error reporting, logging and metrics. The returned guard flushes
/// pending error reports when dropped.
fn init_common(common: CommonConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let CommonConfig { metrics, logging } = common;
    let sentry = init_sentry(&logging)?;
    init_logging(&logging);
    if let Some(metrics) = &metrics {
        init_metrics(metrics)?;
    }
    Ok(sentry)
}

fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    Ok(runtime)
}

fn run_plants(config_file: Option<&Path>) -> Result<(), CliError> {
    let Config { common, plants, .. } = load_config(config_file, Section::Plants)?;
    let plants_config = plants.ok_or(CliError::MissingSection("plants"))?;
    let _sentry = init_common(common)?;

    tracing::info!("Starting plants");
    runtime()?.block_on(plants::run(plants_config))?;

    Ok(())
}

fn run_recognize(config_file: Option<&Path>, event_file: &Path) -> Result<(), CliError> {
    let Config {
        common,
        recognition,
        ..
    } = load_config(config_file, Section::Recognition)?;
    let recognition_config = recognition.ok_or(CliError::MissingSection("recognition"))?;

    let event_error = |reason: String| CliError::Event {
        path: event_file.to_path_buf(),
        reason,
    };
    let data = std::fs::read(event_file).map_err(|e| event_error(e.to_string()))?;
    let event: recognition::event::S3Event =
        serde_json::from_slice(&data).map_err(|e| event_error(e.to_string()))?;

    let _sentry = init_common(common)?;

    let summary = runtime()?.block_on(recognition::run(recognition_config, event))?;
    tracing::info!(
        recognized = summary.recognized,
        skipped = summary.skipped,
        failed = summary.failed,
        "Done"
    );

    Ok(())
}

fn init_sentry(logging: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, CliError> {
    let Some(dsn) = &logging.sentry_dsn else {
        return Ok(None);
    };

    let dsn = dsn
        .parse::<sentry::types::Dsn>()
        .map_err(|e| CliError::SentryDsn(e.to_string()))?;

    Ok(Some(sentry::init(sentry::ClientOptions {
        dsn: Some(dsn),
        release: sentry::release_name!(),
        ..Default::default()
    })))
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let sentry_layer = logging
        .sentry_dsn
        .is_some()
        .then(sentry::integrations::tracing::layer);

    let registry = tracing_subscriber::registry().with(filter).with(sentry_layer);

    match logging.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().with_target(false).json())
            .init(),
    }
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;

    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    tracing::info!(
        host = %metrics.statsd_host,
        port = metrics.statsd_port,
        "Sending metrics to statsd"
    );
    Ok(())
}
