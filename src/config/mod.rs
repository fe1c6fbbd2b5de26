//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, NodeArgs, PublishBranchArgs, SeedArgs, SettingsOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "arbor";
const ENV_PREFIX: &str = "ARBOR";
const DEFAULT_CACHE_TTL_SECS: i64 = 240;
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 1000;
const DEFAULT_INDEX_MISS_WARN_THRESHOLD: u64 = 10;
const DEFAULT_CONSUME_BATCH_LIMIT: u64 = 100;
const DEFAULT_SCHEDULER_CADENCE_SECS: u64 = 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Zero or negative disables memoization.
    pub ttl_seconds: i64,
    pub max_entries: usize,
    pub index_miss_warn_threshold: u32,
    pub consume_batch_limit: usize,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cadence: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);
    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    scheduler: RawSchedulerSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(max) = overrides.cache_max_entries {
            self.cache.max_entries = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            scheduler,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            scheduler: build_scheduler_settings(scheduler)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let ttl_seconds = cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);

    let max_entries = non_zero_usize(
        cache.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
        "cache.max_entries",
    )?;
    let consume_batch_limit = non_zero_usize(
        cache
            .consume_batch_limit
            .unwrap_or(DEFAULT_CONSUME_BATCH_LIMIT),
        "cache.consume_batch_limit",
    )?;

    let threshold = cache
        .index_miss_warn_threshold
        .unwrap_or(DEFAULT_INDEX_MISS_WARN_THRESHOLD);
    if threshold == 0 {
        return Err(LoadError::invalid(
            "cache.index_miss_warn_threshold",
            "must be greater than zero",
        ));
    }
    let index_miss_warn_threshold = u32::try_from(threshold).map_err(|_| {
        LoadError::invalid(
            "cache.index_miss_warn_threshold",
            "value exceeds supported range for u32",
        )
    })?;

    Ok(CacheSettings {
        ttl_seconds,
        max_entries,
        index_miss_warn_threshold,
        consume_batch_limit,
    })
}

fn build_scheduler_settings(
    scheduler: RawSchedulerSettings,
) -> Result<SchedulerSettings, LoadError> {
    let cadence_seconds = scheduler
        .cadence_seconds
        .unwrap_or(DEFAULT_SCHEDULER_CADENCE_SECS);
    if cadence_seconds == 0 {
        return Err(LoadError::invalid(
            "scheduler.cadence_seconds",
            "must be greater than zero",
        ));
    }

    Ok(SchedulerSettings {
        cadence: Duration::from_secs(cadence_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    ttl_seconds: Option<i64>,
    max_entries: Option<u64>,
    index_miss_warn_threshold: Option<u64>,
    consume_batch_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSchedulerSettings {
    cadence_seconds: Option<u64>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<usize, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))
}

#[cfg(test)]
mod tests;
