use bikeforge_core::config_manager::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level;
/// `default_directives` are appended for the binary's own crates.
pub fn init_tracing(config: &LoggingConfig, default_directives: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = config.level.clone();
        if !default_directives.is_empty() {
            directives.push(',');
            directives.push_str(default_directives);
        }
        EnvFilter::new(directives)
    });

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing already initialised: {}", e);
    }
}
