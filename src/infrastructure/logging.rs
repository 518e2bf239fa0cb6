//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Daily rolling file logs with a bounded number of kept files
//! - Level control from configuration, overridable through `RUST_LOG`
//! - Structured JSON file logs (optional)
//! - Console and file output support
//! - Log files stored relative to the executable unless a directory is configured

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, Rotation};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::defaults;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<WorkerGuard>> = Mutex::new(Vec::new());
}

/// Local wall-clock timestamps with milliseconds and offset
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Build the level filter.
///
/// `RUST_LOG` wins when set. Otherwise the configured level applies to
/// everything and the module filters cap chatty dependencies, unless the level
/// is `trace`.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut filter = EnvFilter::new(&config.level);
    if !config.level.to_lowercase().contains("trace") {
        for (module, level) in &config.module_filters {
            if let Ok(directive) = format!("{module}={level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }
    filter
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// # Show browser protocol traffic
/// RUST_LOG="debug,headless_chrome=debug" volume-guard
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);

    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {}: {e}", log_dir.display()))?;

        let appender = rolling::Builder::new()
            .rotation(Rotation::DAILY)
            .filename_prefix(defaults::LOG_FILE_PREFIX)
            .max_log_files(config.max_files.max(1))
            .build(&log_dir)
            .map_err(|e| anyhow!("Failed to create log file appender: {e}"))?;
        let (writer, guard) = non_blocking(appender);

        // Store the guard globally to prevent it from being dropped
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        Some(writer)
    } else {
        None
    };

    let json_file_layer = file_writer
        .clone()
        .filter(|_| config.json_format)
        .map(|writer| {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_current_span(true)
                .with_ansi(false)
        });

    // Plain file layer: time + level + span + message
    let plain_file_layer = file_writer
        .filter(|_| !config.json_format)
        .map(|writer| {
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_thread_ids(false)
                .with_ansi(false)
        });

    let console_layer = config.console_output.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    });

    Registry::default()
        .with(build_env_filter(config))
        .with(json_file_layer)
        .with(plain_file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        file = config.file_output,
        log_dir = %log_dir.display(),
        "Logging system initialized"
    );
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Volume Guard System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {}", current_dir.display());
    }
    info!("=======================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.file_output);
        assert_eq!(config.module_filters.get("headless_chrome").map(String::as_str), Some("warn"));
    }

    #[test]
    fn test_log_directory_is_named_logs() {
        let log_dir = get_log_directory();
        assert!(log_dir.to_string_lossy().ends_with("logs"));
    }

    #[test]
    fn test_no_output_is_rejected() {
        let config = LoggingConfig {
            console_output: false,
            file_output: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging_with_config(&config).is_err());
    }
}
