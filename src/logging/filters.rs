use tracing_subscriber::EnvFilter;

use crate::{logging::config::LoggingConfig, LoggingError};

/// Собирает `EnvFilter`.
///
/// Если задан `RUST_LOG`, используется он. Иначе директива берётся из
/// конфигурации; некорректная директива возвращается как ошибка.
pub fn build_filter_from_config(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return Ok(env_filter);
    }

    let directive = config.build_filter_directive();
    EnvFilter::try_new(&directive).map_err(|e| LoggingError::InvalidDirective {
        directive,
        reason: e.to_string(),
    })
}
