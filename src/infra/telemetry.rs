use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Targets that are too chatty at the application's default level.
const QUIET_TARGETS: &[&str] = &["sqlx::query=warn", "hyper_util=info", "reqwest=info"];

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = env_filter(logging)?;

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

fn env_filter(logging: &LoggingSettings) -> Result<EnvFilter, InfraError> {
    let base = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    QUIET_TARGETS.iter().try_fold(base, |filter, directive| {
        directive
            .parse()
            .map(|directive| filter.add_directive(directive))
            .map_err(|err| InfraError::telemetry(format!("invalid directive `{directive}`: {err}")))
    })
}

/// Register descriptions for every metric the service emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "portfolio_cache_hit_total",
            Unit::Count,
            "Reads answered from the server cache."
        );
        describe_counter!(
            "portfolio_cache_miss_total",
            Unit::Count,
            "Reads that had to run the producer."
        );
        describe_counter!(
            "portfolio_cache_evict_total",
            Unit::Count,
            "Server cache entries evicted because the cache was full."
        );
        describe_counter!(
            "portfolio_rate_limit_rejected_total",
            Unit::Count,
            "Requests rejected by the request gate."
        );
        describe_counter!(
            "portfolio_client_cache_revalidated_total",
            Unit::Count,
            "Background refreshes that replaced a stale client cache value."
        );
    });
}
