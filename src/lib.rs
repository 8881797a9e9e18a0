// Corbel - a controller-driven HTTP framework for Rust
//
// Controllers declare their routes, parameters, middleware, guards and
// interceptors once; the router engine turns those declarations into a
// dispatch pipeline served over hyper.

// Re-export core functionality
pub use corbel_core::*;

pub use corbel_config;

#[cfg(feature = "testing")]
pub use corbel_testing;

use corbel_config::AppConfig;
use corbel_core::logging::LogConfig;
use tracing_appender::non_blocking::WorkerGuard;

/// Build an [`Application`] for `config` without touching global state.
///
/// Production environments mask internal error messages and omit
/// diagnostic details from error bodies.
pub fn application(config: &AppConfig) -> Application {
    let mut app = Application::new().with_host(config.host.clone());
    app.set_production_mode(config.is_production());
    app
}

/// Install logging for `config` and build its [`Application`].
///
/// Keep the returned guard alive until shutdown; dropping it flushes and
/// stops the log writer.
///
/// ```no_run
/// use corbel::corbel_config::AppConfig;
///
/// #[tokio::main]
/// async fn main() -> Result<(), corbel::Error> {
///     let config = AppConfig::load(None)?;
///     let (_guard, app) = corbel::bootstrap(&config)?;
///     app.listen(config.port).await
/// }
/// ```
pub fn bootstrap(config: &AppConfig) -> Result<(WorkerGuard, Application), Error> {
    let guard = log_config(config).init()?;
    logging::info!(
        environment = %config.environment,
        address = %config.address(),
        "Bootstrapping application"
    );
    Ok((guard, application(config)))
}

/// Logging settings derived from `config`.
pub fn log_config(config: &AppConfig) -> LogConfig {
    LogConfig::new()
        .level(config.log_level)
        .format(config.log_format)
        .with_colors(!config.is_production())
}

pub mod prelude {
    pub use corbel_config::{AppConfig, ConfigManager, Environment};
    pub use corbel_core::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;
    use corbel_config::Environment;
    use corbel_core::logging::{LogFormat, LogLevel};

    #[test]
    fn test_application_follows_environment() {
        let config = AppConfig {
            environment: Environment::Production,
            ..AppConfig::default()
        };
        assert!(application(&config).engine().filters().is_production());

        let config = AppConfig::default();
        assert!(!application(&config).engine().filters().is_production());
    }

    #[test]
    fn test_log_config_mapping() {
        let config = AppConfig {
            log_level: LogLevel::Warn,
            log_format: LogFormat::Compact,
            ..AppConfig::default()
        };
        let log = log_config(&config);
        assert_eq!(log.level, LogLevel::Warn);
        assert_eq!(log.format, LogFormat::Compact);
        assert!(log.colors);
    }
}
