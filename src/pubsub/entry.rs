use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Стабильный идентификатор подписки.
///
/// Выдаётся реле при `subscribe` и используется для отписки. В пределах
/// одного реле идентификаторы монотонно растут и никогда не переиспользуются,
/// поэтому две подписки с одинаковыми каналами всё равно различимы.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Создаёт идентификатор из "сырого" значения.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Возвращает "сырое" значение идентификатора.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Результат попытки доставки одного значения одному подписчику.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Значение положено в почтовый ящик.
    Delivered,
    /// Ящик полон (или без буфера и никто не ждёт), значение потеряно.
    Dropped,
    /// Подписка уже отозвана через `unsubscribe`.
    Closed,
    /// Потребитель выбросил приёмник, не отписавшись.
    Disconnected,
}

/// Счётчик приёмников, которые прямо сейчас ждут сообщения.
///
/// Нужен только ящику без буфера: значение передаётся лишь тому, кто уже
/// ждёт. Для буферизованных ящиков счётчик отсутствует.
#[derive(Debug, Clone, Default)]
pub(crate) struct Waiters(Option<Arc<AtomicUsize>>);

/// Отметка "приёмник ждёт", снимается при `Drop`, в том числе при
/// отмене future по таймауту.
pub(crate) struct WaitGuard(Option<Arc<AtomicUsize>>);

impl Waiters {
    fn tracked() -> Self {
        Self(Some(Arc::new(AtomicUsize::new(0))))
    }

    /// Регистрирует ожидающий приёмник до конца жизни guard.
    pub(crate) fn enter(&self) -> WaitGuard {
        if let Some(count) = &self.0 {
            count.fetch_add(1, Ordering::SeqCst);
        }
        WaitGuard(self.0.clone())
    }

    fn any(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|count| count.load(Ordering::SeqCst) > 0)
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Some(count) = &self.0 {
            count.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Запись подписчика в реестре тем.
///
/// Владеет отправляющей половиной ограниченного почтового ящика. Сам ящик
/// никогда не закрывается явно: `close` лишь выставляет флаг, который
/// проверяют издатели, а отправитель освобождается вместе с последней
/// ссылкой на запись (реестр или снимок, по которому идёт доставка).
/// Так доставка в удалённую подписку всегда безопасный no-op.
pub(crate) struct SubscriberEntry<T> {
    id: SubscriberId,
    tx: mpsc::Sender<T>,
    /// `false` для ёмкости 0: значение кладётся в единственный слот
    /// канала, только если приёмник уже ждёт.
    buffered: bool,
    waiters: Waiters,
    closed: AtomicBool,
}

impl<T> SubscriberEntry<T> {
    /// Создаёт запись и возвращает приёмную половину её почтового ящика
    /// вместе со счётчиком ожидающих приёмников.
    pub(crate) fn new(
        id: SubscriberId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<T>, Waiters) {
        // tokio не допускает канал нулевой ёмкости
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let buffered = capacity > 0;
        let waiters = if buffered {
            Waiters::default()
        } else {
            Waiters::tracked()
        };
        let entry = Self {
            id,
            tx,
            buffered,
            waiters: waiters.clone(),
            closed: AtomicBool::new(false),
        };
        (entry, rx, waiters)
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Неблокирующая попытка доставки.
    pub(crate) fn deliver(
        &self,
        value: T,
    ) -> Delivery {
        if self.closed.load(Ordering::Acquire) {
            return Delivery::Closed;
        }
        if !self.buffered {
            if self.tx.is_closed() {
                return Delivery::Disconnected;
            }
            if !self.waiters.any() {
                return Delivery::Dropped;
            }
        }
        // без буфера слот занят, если прошлое значение ещё не забрали
        match self.tx.try_send(value) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }

    /// Помечает запись закрытой. Возвращает `true` только для первого
    /// вызова.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for SubscriberEntry<T> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("buffered", &self.buffered)
            .field("closed", &self.is_closed())
            .finish()
    }
}
