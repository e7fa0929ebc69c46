//! Мьютекс по ключу: эксклюзивный доступ к именованному ресурсу.
//!
//! Не связан с внутренними блокировками реле. Типичный сценарий: много
//! потоков, работающих с набором файлов в непредсказуемом порядке: каждый
//! берёт блокировку по пути файла и отпускает её, закончив работу.

use std::{fmt, sync::Arc, time::Duration};

use dashmap::DashMap;
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex};

/// Набор лениво создаваемых блокировок, по одной на ключ.
#[derive(Default)]
pub struct KeyedMutex {
    locks: DashMap<Arc<str>, Arc<Mutex<()>>>,
}

/// Владение блокировкой ключа.
///
/// Блокировка отпускается при `release` или `Drop`. `release` поглощает
/// guard, поэтому отпустить одну и ту же блокировку дважды невозможно.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct KeyGuard {
    key: Arc<str>,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Возвращает блокировку ключа, создавая её при первом обращении.
    ///
    /// Быстрый путь: чтение шарда; при промахе создание идёт через
    /// `entry` под блокировкой шарда, так что конкурирующие потоки
    /// получают одну и ту же блокировку.
    fn lock_for(
        &self,
        key: &str,
    ) -> (Arc<str>, Arc<Mutex<()>>) {
        if let Some(found) = self.locks.get(key) {
            return (Arc::clone(found.key()), Arc::clone(found.value()));
        }
        let slot = self
            .locks
            .entry(Arc::from(key))
            .or_insert_with(|| Arc::new(Mutex::new(())));
        (Arc::clone(slot.key()), Arc::clone(slot.value()))
    }

    /// Захватывает блокировку ключа, ожидая её освобождения.
    pub fn lock(
        &self,
        key: &str,
    ) -> KeyGuard {
        let (key, mutex) = self.lock_for(key);
        let guard = mutex.lock_arc();
        tracing::trace!(key = %key, "key locked");
        KeyGuard { key, _guard: guard }
    }

    /// Пытается захватить блокировку без ожидания.
    pub fn try_lock(
        &self,
        key: &str,
    ) -> Option<KeyGuard> {
        let (key, mutex) = self.lock_for(key);
        let guard = mutex.try_lock_arc()?;
        Some(KeyGuard { key, _guard: guard })
    }

    /// Пытается захватить блокировку, ожидая не дольше `timeout`.
    pub fn try_lock_for(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Option<KeyGuard> {
        let (key, mutex) = self.lock_for(key);
        match mutex.try_lock_arc_for(timeout) {
            Some(guard) => Some(KeyGuard { key, _guard: guard }),
            None => {
                tracing::debug!(key = %key, ?timeout, "key lock timed out");
                None
            }
        }
    }

    /// Захвачена ли сейчас блокировка ключа.
    pub fn is_locked(
        &self,
        key: &str,
    ) -> bool {
        self.locks
            .get(key)
            .is_some_and(|mutex| mutex.value().is_locked())
    }

    /// Количество известных ключей.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Удаляет блокировки, которые никто не держит и не ждёт.
    ///
    /// Возвращает количество удалённых ключей.
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        // ссылки клонируются только под блокировкой шарда, поэтому счётчик
        // здесь не может вырасти
        self.locks
            .retain(|_, mutex| Arc::strong_count(mutex) > 1 || mutex.is_locked());
        before.saturating_sub(self.locks.len())
    }
}

impl KeyGuard {
    /// Ключ, которым владеет guard.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Явно отпускает блокировку. Аналогично `drop(self)`.
    pub fn release(self) {
        tracing::trace!(key = %self.key, "key released");
    }
}

impl fmt::Debug for KeyedMutex {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KeyedMutex")
            .field("keys", &self.locks.len())
            .finish()
    }
}

impl fmt::Debug for KeyGuard {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KeyGuard").field("key", &self.key).finish()
    }
}
