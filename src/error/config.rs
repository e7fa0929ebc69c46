use thiserror::Error;

/// Ошибки загрузки и проверки конфигурации.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Ошибки инициализации подсистемы логирования.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },

    #[error("global tracing subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}
