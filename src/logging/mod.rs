pub mod config;
pub mod filters;
pub mod formatter;

pub use self::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::LoggingError;

/// Инициализация логирования с конфигурацией.
///
/// Устанавливает глобальный subscriber; повторный вызов возвращает
/// `LoggingError::AlreadyInitialized`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = filters::build_filter_from_config(config)?;
    let fmt_layer = formatter::build_formatter_from_config(config);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        format = ?config.format,
        "Logging system initialized"
    );
    Ok(())
}
