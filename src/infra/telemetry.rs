use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the crate records. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "arbor_cache_hit_total",
            Unit::Count,
            "Total number of memoizer hits."
        );
        describe_counter!(
            "arbor_cache_miss_total",
            Unit::Count,
            "Total number of memoizer misses that ran the producer."
        );
        describe_counter!(
            "arbor_index_fallback_total",
            Unit::Count,
            "Items found in the store after the search index missed them."
        );
        describe_gauge!(
            "arbor_tree_change_queue_len",
            Unit::Count,
            "Current number of pending tree changes."
        );
        describe_histogram!(
            "arbor_cache_consume_ms",
            Unit::Milliseconds,
            "Tree change consumption latency in milliseconds."
        );
    });
}
