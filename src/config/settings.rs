use std::path::Path;

use serde::{Deserialize, Serialize};

use config::{Config, Environment, File};

use crate::{ConfigError, LoggingConfig};

/// Ёмкость ящика подписчика по умолчанию.
pub const DEFAULT_CAPACITY: usize = 16;

/// Префикс переменных окружения: `PUBRELAY__RELAY__CAPACITY=64`.
pub const ENV_PREFIX: &str = "PUBRELAY";

/// Настройки реле.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Ёмкость почтового ящика каждой подписки. 0 означает ящик без буфера.
    pub capacity: usize,
}

/// Полная конфигурация приложения, использующего реле.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay: RelayConfig,
    pub logging: LoggingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Settings {
    /// Загружает настройки из значений по умолчанию и окружения.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Загружает настройки: значения по умолчанию, затем файл (если
    /// указан), затем переменные окружения с префиксом `PUBRELAY`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            // Добавляем значения по умолчанию
            .set_default("relay.capacity", DEFAULT_CAPACITY as i64)?
            .set_default("logging.level", "info")?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            // Добавляем переменные окружения с префиксом PUBRELAY__
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Десериализуем конфигурацию в нашу структуру
        let settings: Settings = cfg.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::{env, io::Write};

    use serial_test::serial;

    use super::*;
    use crate::LogFormat;

    fn clear_env() {
        env::remove_var("PUBRELAY__RELAY__CAPACITY");
        env::remove_var("PUBRELAY__LOGGING__LEVEL");
        env::remove_var("PUBRELAY__LOGGING__FORMAT");
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let settings = Settings::load().unwrap();
        assert_eq!(settings.relay.capacity, DEFAULT_CAPACITY);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    /// Тест проверяет переопределение значений переменными окружения.
    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        env::set_var("PUBRELAY__RELAY__CAPACITY", "64");
        env::set_var("PUBRELAY__LOGGING__FORMAT", "json");

        let settings = Settings::load().unwrap();
        clear_env();

        assert_eq!(settings.relay.capacity, 64);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    /// Тест проверяет загрузку из TOML-файла и приоритет окружения над
    /// файлом.
    #[test]
    #[serial]
    fn test_file_then_env() {
        clear_env();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[relay]\ncapacity = 2\n\n[logging]\nlevel = \"debug\"\nformat = \"pretty\""
        )
        .unwrap();

        let settings = Settings::load_from(Some(file.path())).unwrap();
        assert_eq!(settings.relay.capacity, 2);
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Pretty);

        env::set_var("PUBRELAY__RELAY__CAPACITY", "8");
        let settings = Settings::load_from(Some(file.path())).unwrap();
        clear_env();
        assert_eq!(settings.relay.capacity, 8);
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        clear_env();
        let err = Settings::load_from(Some(Path::new("/nonexistent/pubrelay.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    #[serial]
    fn test_empty_level_rejected() {
        clear_env();
        env::set_var("PUBRELAY__LOGGING__LEVEL", "");
        let res = Settings::load();
        clear_env();
        assert!(matches!(
            res,
            Err(ConfigError::Invalid {
                field: "logging.level",
                ..
            })
        ));
    }
}
