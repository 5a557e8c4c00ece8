//! Tracing subscriber setup

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetrySettings;

/// Installs the global subscriber
///
/// `RUST_LOG` wins over the configured level. Calling this twice is
/// harmless: the second installation attempt is ignored.
pub fn init(settings: &TelemetrySettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if settings.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    if installed.is_ok() {
        tracing::debug!(level = %settings.level, json = settings.json, "Telemetry initialized");
    }
}
