use thiserror::Error;
use tokio::sync::mpsc;

use crate::pubsub::SubscriberId;

/// Ошибки операций реле (подписка и отписка).
///
/// Медленный или отсутствующий потребитель ошибкой не является:
/// `publish` никогда не возвращает `RelayError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("topic key must not be empty")]
    InvalidTopic,

    #[error("topic not found: {topic}")]
    TopicNotFound { topic: String },

    #[error("subscriber {id} not found on topic {topic}")]
    SubscriberNotFound { topic: String, id: SubscriberId },
}

/// Ошибка при получении сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecvError {
    #[error("channel is closed")]
    Closed,

    #[error("operation exceeded the specified timeout")]
    Timeout,
}

/// Ошибка при неблокирующем получении сообщений.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TryRecvError {
    #[error("no messages available")]
    Empty,

    #[error("channel is closed")]
    Closed,
}

// === Преобразования ===

impl From<mpsc::error::TryRecvError> for TryRecvError {
    fn from(err: mpsc::error::TryRecvError) -> Self {
        match err {
            mpsc::error::TryRecvError::Empty => TryRecvError::Empty,
            mpsc::error::TryRecvError::Disconnected => TryRecvError::Closed,
        }
    }
}

impl RelayError {
    /// Является ли ошибка сигналом "не найдено" (повторная отписка,
    /// отписка от несуществующей темы).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RelayError::TopicNotFound { .. } | RelayError::SubscriberNotFound { .. }
        )
    }
}
