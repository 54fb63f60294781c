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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "pulse_cache_hit_total",
            Unit::Count,
            "Reads served from the KV store, labelled by cache."
        );
        describe_counter!(
            "pulse_cache_miss_total",
            Unit::Count,
            "Reads that fell through to Postgres, labelled by cache."
        );
        describe_counter!(
            "pulse_kv_evict_total",
            Unit::Count,
            "Entries evicted from the in-process KV store due to capacity."
        );
        describe_counter!(
            "pulse_counter_increment_total",
            Unit::Count,
            "Counter increments, labelled by metric kind."
        );
        describe_counter!(
            "pulse_counter_cas_retry_total",
            Unit::Count,
            "Compare-and-swap increments that lost a race and retried."
        );
        describe_counter!(
            "pulse_counter_flush_total",
            Unit::Count,
            "Counters written back to Postgres, labelled by result."
        );
        describe_histogram!(
            "pulse_counter_flush_ms",
            Unit::Milliseconds,
            "Counter flush latency in milliseconds."
        );
        describe_histogram!(
            "pulse_tag_sync_ms",
            Unit::Milliseconds,
            "Tag recount and index rebuild latency in milliseconds."
        );
        describe_gauge!(
            "pulse_tag_index_size",
            Unit::Count,
            "Number of tags in the current index snapshot."
        );
        describe_counter!(
            "pulse_job_failure_total",
            Unit::Count,
            "Background job runs that failed, labelled by job."
        );
    });
}
