use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Формат вывода логов.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Конфигурация логирования.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Директива фильтра: `info`, `pubrelay=debug,warn` и т.п.
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_line_numbers: bool,
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_target: true,
            with_thread_ids: false,
            with_line_numbers: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Директива для `EnvFilter`, если `RUST_LOG` не задан.
    pub fn build_filter_directive(&self) -> String {
        self.level.trim().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
