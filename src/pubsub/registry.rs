use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;

use super::{SubscriberEntry, SubscriberId};
use crate::RelayError;

/// Неизменяемая последовательность подписчиков одной темы.
///
/// Любая мутация строит новую последовательность и подменяет ею старую,
/// поэтому держатель ссылки видит стабильный набор без блокировок.
type Entries<T> = Arc<[Arc<SubscriberEntry<T>>]>;

/// Реестр тем: ключ темы -> подписчики.
///
/// Подписка и отписка берут блокировку на запись. Снимок для `publish`
/// берёт блокировку на чтение ровно на время клонирования одного `Arc`,
/// так что издатели не задерживают мутации дольше константного времени.
///
/// Инвариант: тема, присутствующая в карте, всегда имеет хотя бы одного
/// подписчика.
pub(crate) struct Registry<T> {
    topics: RwLock<HashMap<Arc<str>, Entries<T>>>,
}

/// Снимок подписчиков темы на момент вызова `Registry::snapshot`.
///
/// Не зависит от последующих изменений реестра и не требует синхронизации.
pub(crate) struct Snapshot<T> {
    entries: Option<Entries<T>>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Возвращает коллекцию темы, создавая пустую при отсутствии.
    ///
    /// Вызывается только под блокировкой на запись и только перед вставкой,
    /// поэтому пустая тема никогда не видна другим потокам.
    fn ensure_topic<'a>(
        topics: &'a mut HashMap<Arc<str>, Entries<T>>,
        key: &str,
    ) -> (Arc<str>, &'a mut Entries<T>) {
        let name = topics
            .get_key_value(key)
            .map(|(name, _)| Arc::clone(name))
            .unwrap_or_else(|| Arc::from(key));

        let entries = match topics.entry(Arc::clone(&name)) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                tracing::debug!(topic = key, "topic created");
                slot.insert(Arc::from(Vec::new()))
            }
        };
        (name, entries)
    }

    /// Добавляет подписчика в конец коллекции темы.
    ///
    /// Возвращает общий ключ темы и идентификатор записи.
    pub(crate) fn insert(
        &self,
        key: &str,
        entry: Arc<SubscriberEntry<T>>,
    ) -> (Arc<str>, SubscriberId) {
        let id = entry.id();
        let mut topics = self.topics.write();
        let (name, entries) = Self::ensure_topic(&mut topics, key);

        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(entry);
        *entries = Arc::from(next);

        (name, id)
    }

    /// Удаляет подписчика по идентификатору и возвращает его запись.
    ///
    /// Если коллекция опустела, тема удаляется целиком.
    pub(crate) fn remove(
        &self,
        key: &str,
        id: SubscriberId,
    ) -> Result<Arc<SubscriberEntry<T>>, RelayError> {
        let mut topics = self.topics.write();
        let Some(entries) = topics.get_mut(key) else {
            return Err(RelayError::TopicNotFound {
                topic: key.to_string(),
            });
        };

        let Some(removed) = entries.iter().find(|entry| entry.id() == id).cloned() else {
            return Err(RelayError::SubscriberNotFound {
                topic: key.to_string(),
                id,
            });
        };

        if entries.len() == 1 {
            topics.remove(key);
            tracing::debug!(topic = key, "topic removed");
        } else {
            let next: Vec<_> = entries
                .iter()
                .filter(|entry| entry.id() != id)
                .cloned()
                .collect();
            *entries = Arc::from(next);
        }

        Ok(removed)
    }

    /// Снимает копию текущих подписчиков темы.
    pub(crate) fn snapshot(
        &self,
        key: &str,
    ) -> Snapshot<T> {
        let entries = self.topics.read().get(key).cloned();
        Snapshot { entries }
    }

    pub(crate) fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.topics.read().contains_key(key)
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    pub(crate) fn subscriber_count(
        &self,
        key: &str,
    ) -> usize {
        self.topics.read().get(key).map_or(0, |entries| entries.len())
    }

    pub(crate) fn total_subscribers(&self) -> usize {
        self.topics.read().values().map(|entries| entries.len()).sum()
    }

    /// Имена всех тем в произвольном порядке.
    pub(crate) fn topics(&self) -> Vec<Arc<str>> {
        self.topics.read().keys().cloned().collect()
    }
}

impl<T> Snapshot<T> {
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<SubscriberEntry<T>>> {
        self.entries.iter().flat_map(|entries| entries.iter())
    }

    /// Пуст ли снимок. Тема в реестре всегда непуста, так что пустой
    /// снимок означает отсутствие темы.
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.as_ref().map_or(true, |entries| entries.is_empty())
    }
}
