use std::{fmt, sync::Arc, time::Duration};

use tokio::sync::mpsc;

use super::{SubscriberId, Waiters};
use crate::{RecvError, TryRecvError};

/// Приёмная сторона подписки на тему.
///
/// Сообщения приходят в порядке их постановки в ящик. Поток завершается
/// (`RecvError::Closed`), когда подписка отозвана через
/// [`Relay::unsubscribe`](crate::Relay::unsubscribe) и буфер вычитан.
///
/// Выброс `Subscription` без отписки допустим: реле удалит такую запись
/// при ближайшей публикации в тему.
///
/// При ёмкости 0 сообщение доходит, только если приёмник уже ждёт в
/// `recv`, `recv_timeout` или `blocking_recv`. `try_recv` и `drain` не
/// ждут и забирают лишь значение, переданное до отмены ожидания.
pub struct Subscription<T> {
    /// Название темы, на которую подписаны.
    topic: Arc<str>,
    /// Идентификатор для отписки.
    id: SubscriberId,
    /// Внутренний приёмник для входящих сообщений.
    inner: mpsc::Receiver<T>,
    /// Ожидающие приёмники (только для ящика без буфера).
    waiters: Waiters,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        topic: Arc<str>,
        id: SubscriberId,
        inner: mpsc::Receiver<T>,
        waiters: Waiters,
    ) -> Self {
        Self {
            topic,
            id,
            inner,
            waiters,
        }
    }

    /// Возвращает имя темы, на которую подписались.
    pub fn topic(&self) -> &Arc<str> {
        &self.topic
    }

    /// Возвращает идентификатор подписки для `Relay::unsubscribe`.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Асинхронно ожидает следующее сообщение.
    ///
    /// # Возвращает
    /// - `Ok(T)` при успешном получении сообщения
    /// - `Err(RecvError::Closed)` если подписка отозвана и буфер пуст
    pub async fn recv(&mut self) -> Result<T, RecvError> {
        let _waiting = self.waiters.enter();
        self.inner.recv().await.ok_or(RecvError::Closed)
    }

    /// Как [`recv`](Self::recv), но не дольше `timeout`.
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<T, RecvError> {
        let _waiting = self.waiters.enter();
        match tokio::time::timeout(timeout, self.inner.recv()).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(RecvError::Closed),
            Err(_) => Err(RecvError::Timeout),
        }
    }

    /// Пытается получить сообщение без ожидания.
    ///
    /// # Возвращает
    /// - `Ok(T)` если сообщение доступно немедленно
    /// - `Err(TryRecvError::Empty)` если сообщений нет
    /// - `Err(TryRecvError::Closed)` если подписка отозвана и буфер пуст
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.inner.try_recv().map_err(Into::into)
    }

    /// Блокирует текущий поток до прихода сообщения.
    ///
    /// # Panics
    /// При вызове из асинхронного контекста tokio.
    pub fn blocking_recv(&mut self) -> Result<T, RecvError> {
        let _waiting = self.waiters.enter();
        self.inner.blocking_recv().ok_or(RecvError::Closed)
    }

    /// Итератор, блокирующийся на каждом сообщении до конца потока.
    ///
    /// # Panics
    /// При использовании из асинхронного контекста tokio.
    pub fn blocking_iter(&mut self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.blocking_recv().ok())
    }

    /// Забирает все уже доставленные сообщения без ожидания.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Ok(value) = self.inner.try_recv() {
            out.push(value);
        }
        out
    }

    /// Проверяет, завершён ли поток (отправитель освобождён).
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Возвращает количество сообщений в очереди на получение.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Проверяет, пуста ли очередь сообщений.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Разбирает подписку на приёмник и идентификатор.
    ///
    /// Голый приёмник не регистрирует ожидание, поэтому при ёмкости 0 он
    /// ничего не получит.
    pub fn into_parts(self) -> (mpsc::Receiver<T>, SubscriberId) {
        (self.inner, self.id)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("queued", &self.len())
            .finish()
    }
}
