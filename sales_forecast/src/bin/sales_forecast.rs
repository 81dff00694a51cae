//! Sales Forecast command-line tool

use anyhow::Context;
use clap::{Parser, Subcommand};
use sales_forecast::config::PipelineConfig;
use sales_forecast::logging::init_logging;
use sales_forecast::pipeline::TrainPipeline;
use sales_forecast::service::ForecastService;
use sales_forecast::synthetic::SyntheticSales;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "sales-forecast")]
#[command(about = "Train and serve daily sales forecasts", version)]
struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging level, overridden by RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for per-run log files
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest, clean, tune, train and persist a model
    Train {
        /// Raw transaction CSV, overrides the configured path
        #[arg(long)]
        data: Option<PathBuf>,

        /// Artifacts directory, overrides the configured path
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Evaluate grid candidates in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Forecast the next N days with the persisted model
    Forecast {
        /// Number of future days
        #[arg(short, long, allow_negative_numbers = true)]
        periods: i64,

        /// Artifacts directory, overrides the configured path
        #[arg(long)]
        artifacts: Option<PathBuf>,

        /// Write every forecast row to this CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a synthetic transaction CSV
    Generate {
        #[arg(short, long, default_value = "data/sales.csv")]
        output: PathBuf,

        #[arg(long, default_value = "400")]
        days: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn load_config(args: &Args) -> anyhow::Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.logging.log_dir = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = load_config(&args)?;
    let guard = init_logging(&config.logging)?;
    if let Some((_, path)) = &guard {
        info!(path = %path.display(), "Writing logs to file");
    }

    let result = run(args.command, &mut config);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn run(command: Command, config: &mut PipelineConfig) -> anyhow::Result<()> {
    match command {
        Command::Train {
            data,
            artifacts,
            parallel,
        } => {
            if let Some(data) = data {
                config.paths.raw_data = data;
            }
            if let Some(artifacts) = artifacts {
                config.paths.artifacts_dir = artifacts;
            }
            config.search.parallel |= parallel;

            let outcome = TrainPipeline::new(config.clone())?.run()?;
            println!("Best parameters: {}", outcome.search.best.params);
            println!("Cross-validation MAPE: {:.2}%", outcome.search.best.cv_mape);
            print!("{}", outcome.metrics);
            println!("Model saved to {}", config.paths.model_json().display());
        }
        Command::Forecast {
            periods,
            artifacts,
            output,
        } => {
            if let Some(artifacts) = artifacts {
                config.paths.artifacts_dir = artifacts;
            }
            let service = ForecastService::load(&config.paths, &config.forecast)?;
            let forecast = service.forecast(periods)?;

            print!("{}", forecast.summary());
            println!();
            println!("{:<12} {:>12} {:>12} {:>12}", "date", "yhat", "lower", "upper");
            for row in forecast.future() {
                println!(
                    "{:<12} {:>12.2} {:>12.2} {:>12.2}",
                    row.date, row.yhat, row.yhat_lower, row.yhat_upper
                );
            }

            if let Some(path) = output {
                forecast
                    .to_csv(&path)
                    .with_context(|| format!("writing forecast to {}", path.display()))?;
                println!("Forecast written to {}", path.display());
            }
        }
        Command::Generate { output, days, seed } => {
            let sales = SyntheticSales::default().with_days(days).with_seed(seed);
            let rows = sales.write_csv(
                &output,
                &config.ingestion.date_column,
                &config.ingestion.quantity_column,
            )?;
            println!("Wrote {} transactions over {} days to {}", rows, days, output.display());
        }
    }
    Ok(())
}
