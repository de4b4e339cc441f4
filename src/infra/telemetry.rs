use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
///
/// Logs go to stderr so rendered output on stdout stays clean.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "fenceline_highlight_requests_total",
            Unit::Count,
            "Total number of batched highlight requests sent."
        );
        describe_counter!(
            "fenceline_highlight_failures_total",
            Unit::Count,
            "Total number of highlight requests that failed or timed out."
        );
        describe_counter!(
            "fenceline_highlight_blocks_total",
            Unit::Count,
            "Total number of block variants sent for highlighting."
        );
        describe_counter!(
            "fenceline_highlight_cache_hit_total",
            Unit::Count,
            "Total number of block variants served from the result cache."
        );
        describe_counter!(
            "fenceline_snippet_miss_total",
            Unit::Count,
            "Total number of snippet references that did not resolve to a file."
        );
        describe_histogram!(
            "fenceline_highlight_request_ms",
            Unit::Milliseconds,
            "Highlight request latency in milliseconds."
        );
    });
}
