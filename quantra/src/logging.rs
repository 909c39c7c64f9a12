use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialise default non-JSON `Quantra` logging.
///
/// `RUST_LOG` overrides the configured default directive.
pub fn init_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initialise default JSON `Quantra` logging.
pub fn init_json_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}

fn env_filter(default_level: &str) -> tracing_subscriber::filter::EnvFilter {
    tracing_subscriber::filter::EnvFilter::builder()
        .with_default_directive(
            default_level
                .parse()
                .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .from_env_lossy()
}
