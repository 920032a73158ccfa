//! Logging setup for the dataset builder.
//!
//! The level comes from `WVW_LOG_LEVEL` unless the CLI passed `-v`, in which
//! case the verbosity count wins. Format and target display only come from the
//! environment.

use std::env;
use std::path::Path;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "WVW_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "WVW_LOG_FORMAT";
pub const LOG_TARGET_ENV: &str = "WVW_LOG_TARGET";

const DEFAULT_LEVEL: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `warn` or `wvw_skirmish=debug`.
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Process environment, then `-v` count on top.
    pub fn from_env_and_verbosity(verbose: u8) -> Self {
        let mut config = Self::from_lookup(|key| env::var(key).ok());
        config.apply_verbosity(verbose);
        config
    }

    /// Builds a config from any key lookup; unparseable values keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(level) = lookup(LOG_LEVEL_ENV) {
            let level = level.trim();
            if !level.is_empty() {
                config.level = level.to_string();
            }
        }
        if let Some(format) = lookup(LOG_FORMAT_ENV).as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }
        if let Some(include_target) = lookup(LOG_TARGET_ENV).as_deref().and_then(parse_flag) {
            config.include_target = include_target;
        }

        config
    }

    /// `-v` selects `info`, `-vv` and beyond select `debug`; zero is a no-op.
    pub fn apply_verbosity(&mut self, verbose: u8) {
        let level = match verbose {
            0 => return,
            1 => "info",
            _ => "debug",
        };
        self.level = level.to_string();
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_target(config.include_target)
        .with_ansi(config.format == LogFormat::Pretty);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}

pub fn log_app_start(config: &LoggingConfig, command: &str) {
    info!(
        component = "skirmish_dataset",
        event = "app.start",
        command,
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_paths_selected(lookup_dir: &Path, data_root: &Path) {
    info!(
        component = "skirmish_dataset",
        event = "app.paths",
        lookup_dir = %lookup_dir.display(),
        data_root = %data_root.display()
    );
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
