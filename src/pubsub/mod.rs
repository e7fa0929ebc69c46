//! Подсистема Publish–Subscribe (pub/sub).
//!
//! Этот модуль реализует лёгкое реле для внутрипроцессного вещания
//! значений по темам:
//!
//! - `relay`: протокол подписки, отписки и публикации.
//! - `registry` (приватный): реестр тем с копированием при записи.
//! - `entry` (приватный): запись подписчика и её почтовый ящик.
//! - `subscriber`: приёмная сторона подписки.
//! - `stats`: итоги публикаций и статистика реле.
//!
//! Публичный API переэкспортирует:
//! - `relay::Relay`
//! - `entry::SubscriberId`
//! - `subscriber::Subscription`
//! - `stats::{PublishReport, RelayStats}`

mod entry;
mod registry;
pub mod relay;
pub mod stats;
pub mod subscriber;

pub(crate) use entry::{Delivery, SubscriberEntry, Waiters};
pub use entry::SubscriberId;
pub use relay::Relay;
pub use stats::{PublishReport, RelayStats};
pub use subscriber::Subscription;
