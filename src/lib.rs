/// Relay settings loading (defaults, file, environment).
pub mod config;
/// Common error types: relay operations, receiving, configuration.
pub mod error;
/// Per-key mutual exclusion for named resources.
pub mod keylock;
/// Logging setup (formatting, filters).
pub mod logging;
/// Pub/Sub: Relay, Subscription, SubscriberId.
pub mod pubsub;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Configuration.
pub use self::config::{RelayConfig, Settings};
/// Operation errors.
pub use error::{ConfigError, LoggingError, RecvError, RelayError, TryRecvError};
/// Keyed mutex.
pub use keylock::{KeyGuard, KeyedMutex};
/// Logging initialization.
pub use logging::{init_logging, LogFormat, LoggingConfig};
/// Pub/Sub API.
pub use pubsub::{PublishReport, Relay, RelayStats, SubscriberId, Subscription};
