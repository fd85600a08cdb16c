//! Tracing subscriber initialisation.

use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LogFormat;
use crate::error::{MonitorError, MonitorResult};

/// Install the global subscriber. `RUST_LOG` overrides `log_level`.
pub fn init(log_level: &str, format: LogFormat) -> MonitorResult<()> {
    match format {
        LogFormat::Compact => init_with_layer(
            log_level,
            tracing_subscriber::fmt::layer().compact().with_target(true),
        ),
        LogFormat::Json => init_with_layer(
            log_level,
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_target(true),
        ),
    }
}

fn build_env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{log_level},reqwest=warn,hyper=warn,hyper_util=warn,html5ever=warn,selectors=warn"
        ))
    })
}

fn init_with_layer<L>(log_level: &str, fmt_layer: L) -> MonitorResult<()>
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(build_env_filter(log_level))
        .try_init()
        .map_err(|e| MonitorError::internal(format!("failed to initialise tracing subscriber: {e}")))
}
