use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Crates whose logs follow `logging.level`; everything else is held at `warn`.
const OWN_TARGETS: [&str; 2] = ["folio", "folio_api_types"];

/// Install the global subscriber for the `folio` binary.
///
/// Logs go to stderr so command output on stdout stays machine-readable. `RUST_LOG`, when set,
/// replaces the configured directives.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives(logging.level)))
        .map_err(|err| InfraError::telemetry(format!("invalid log directives: {err}")))?;

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("logging is already initialised: {err}"))
        })
}

fn default_directives(level: LevelFilter) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_query_cache_hit_total",
            Unit::Count,
            "Queries answered from a fresh cache entry."
        );
        describe_counter!(
            "folio_query_cache_miss_total",
            Unit::Count,
            "Queries that started a fetch."
        );
        describe_counter!(
            "folio_query_dedup_join_total",
            Unit::Count,
            "Queries that joined an in-flight fetch instead of starting one."
        );
        describe_counter!(
            "folio_query_discarded_total",
            Unit::Count,
            "Fetch results dropped because a newer request superseded them."
        );
        describe_counter!(
            "folio_store_evict_total",
            Unit::Count,
            "Entries evicted from the entity store due to capacity."
        );
        describe_counter!(
            "folio_mutation_total",
            Unit::Count,
            "Mutations run, labelled by outcome."
        );
        describe_counter!(
            "folio_invalidated_keys_total",
            Unit::Count,
            "Cache keys invalidated by successful mutations."
        );
        describe_counter!(
            "folio_auto_scrape_fired_total",
            Unit::Count,
            "Scrapes triggered automatically because the catalog was empty."
        );
        describe_histogram!(
            "folio_query_fetch_ms",
            Unit::Milliseconds,
            "Remote fetch latency in milliseconds."
        );
    });
}
