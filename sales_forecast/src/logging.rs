//! Tracing subscriber setup for the command-line tool

use crate::config::LogConfig;
use crate::error::{ForecastError, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Name of the log file for a run started now, e.g. `log_2024_05_01_12_00_00.log`
pub fn log_file_name() -> String {
    chrono::Local::now()
        .format("log_%Y_%m_%d_%H_%M_%S.log")
        .to_string()
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Events go to stderr and, when
/// `log_dir` is set, to a per-run file in that directory. The returned guard
/// flushes the file writer on drop and must outlive the run.
pub fn init_logging(config: &LogConfig) -> Result<Option<(WorkerGuard, PathBuf)>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            ForecastError::ConfigError(format!("Invalid log level '{}': {}", config.level, e))
        })?;

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let name = log_file_name();
            let appender = tracing_appender::rolling::never(dir, &name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some((guard, dir.join(name))))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| ForecastError::ConfigError(format!("Logging already initialized: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_timestamped() {
        let name = log_file_name();
        assert!(name.starts_with("log_"));
        assert!(name.ends_with(".log"));
        // log_YYYY_MM_DD_HH_MM_SS.log
        assert_eq!(name.len(), "log_2024_01_01_00_00_00.log".len());
    }

    #[test]
    fn bad_level_is_a_config_error() {
        let config = LogConfig {
            level: "sales_forecast=loud".to_string(),
            log_dir: None,
        };
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                init_logging(&config),
                Err(ForecastError::ConfigError(_))
            ));
        }
    }
}
