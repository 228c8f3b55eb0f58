/*!
 * Telemetry
 * Structured tracing initialization for the diagnostic session
 */

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured tracing.
///
/// Environment variables:
/// - RUST_LOG: log level filter (default: info)
/// - MEMSTRESS_TRACE_JSON: emit JSON instead of human-readable output
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("MEMSTRESS_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).compact())
            .init();
        info!("Structured tracing initialized");
    }
}
