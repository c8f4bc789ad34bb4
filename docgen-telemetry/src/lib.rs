//! Telemetry initialization and configuration

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Configuration for the telemetry system
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub default_level: Option<String>,
    pub log_directives: Vec<String>,
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), ..Default::default() }
    }

    /// Set the default log level (e.g., "debug", "info").
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.default_level = Some(level.into());
        self
    }

    /// Add a custom tracing directive (e.g., "docgen_workflow=debug").
    pub fn with_log_directive(mut self, directive: impl Into<String>) -> Self {
        self.log_directives.push(directive.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Supported variables:
    /// - `SERVICE_NAME`: The name of the service (default: "docgen")
    /// - `LOG_LEVEL`: Default log level (default: "info")
    pub fn from_env() -> Self {
        let service_name = std::env::var("SERVICE_NAME").unwrap_or_else(|_| "docgen".to_string());
        let default_level = std::env::var("LOG_LEVEL").ok();
        Self { service_name, default_level, log_directives: Vec::new() }
    }
}

/// Initialize telemetry with basic console logging.
pub fn init_telemetry(service_name: &str) {
    init_with_config(TelemetryConfig::new(service_name));
}

/// Initialize telemetry with the given configuration. Safe to call more
/// than once; only the first call installs a subscriber.
pub fn init_with_config(config: TelemetryConfig) {
    INIT.call_once(|| {
        let level = config.default_level.as_deref().unwrap_or("info");
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));
        for directive in &config.log_directives {
            if let Ok(parsed) = directive.parse() {
                filter = filter.add_directive(parsed);
            }
        }

        let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
        tracing_subscriber::registry().with(filter).with(fmt_layer).init();

        tracing::debug!(service = %config.service_name, "telemetry initialized");
    });
}
