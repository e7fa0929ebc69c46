pub mod settings;

pub use self::settings::{RelayConfig, Settings, DEFAULT_CAPACITY, ENV_PREFIX};
