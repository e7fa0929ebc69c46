use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use super::{
    registry::Registry, stats::Counters, Delivery, PublishReport, RelayStats, SubscriberEntry,
    SubscriberId, Subscription,
};
use crate::{RelayConfig, RelayError};

/// Внутрипроцессное реле Publish–Subscribe.
///
/// Поддерживает:
/// - Любое число независимых подписок на одну тему
/// - Ограниченный почтовый ящик на каждую подписку
/// - Неблокирующую публикацию: при полном буфере подписчик пропускает
///   сообщение
/// - Автоматическое удаление пустых тем
/// - Статистику публикаций и потерь
///
/// Публикация берёт блокировку реестра на чтение только на время снятия
/// снимка. Доставка идёт уже без блокировки, параллельно с подписками и
/// отписками.
pub struct Relay<T> {
    /// Темы -> подписчики.
    registry: Registry<T>,
    /// Ёмкость почтового ящика каждой новой подписки.
    capacity: usize,
    /// Источник идентификаторов подписок.
    next_id: AtomicU64,
    /// Счётчики публикаций.
    counters: Counters,
}

impl<T> Relay<T>
where
    T: Clone + Send + 'static,
{
    /// Создаёт новое `Relay` с заданной ёмкостью ящиков подписчиков.
    ///
    /// Ёмкость 0 означает отсутствие буфера: сообщение получает только
    /// подписчик, который в момент публикации уже ждёт его, остальные
    /// сообщение теряют.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            tracing::warn!(
                "relay created with zero capacity, messages reach waiting receivers only"
            );
        }
        Self {
            registry: Registry::new(),
            capacity,
            next_id: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Создаёт реле по секции конфигурации.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Ёмкость ящика каждой подписки.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Подписка на тему.
    ///
    /// Создаёт тему при первой подписке. Пустое имя темы отклоняется без
    /// изменения состояния.
    pub fn subscribe(
        &self,
        topic: &str,
    ) -> Result<Subscription<T>, RelayError> {
        if topic.is_empty() {
            return Err(RelayError::InvalidTopic);
        }

        let id = SubscriberId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (entry, rx, waiters) = SubscriberEntry::new(id, self.capacity);
        let (name, id) = self.registry.insert(topic, Arc::new(entry));

        tracing::debug!(topic, subscriber = %id, capacity = self.capacity, "subscription created");

        Ok(Subscription::new(name, id, rx, waiters))
    }

    /// Отписка по идентификатору.
    ///
    /// Удаляет запись из темы (и тему, если она опустела) и закрывает
    /// доставку. Повторная отписка или отписка от чужой темы возвращает
    /// ошибку "не найдено" и больше ничего не делает.
    pub fn unsubscribe(
        &self,
        topic: &str,
        id: SubscriberId,
    ) -> Result<(), RelayError> {
        let entry = match self.registry.remove(topic, id) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(topic, subscriber = %id, error = %err, "unsubscribe ignored");
                return Err(err);
            }
        };
        entry.close();

        tracing::debug!(topic, subscriber = %id, "subscription removed");
        Ok(())
    }

    /// Публикация значения в тему.
    ///
    /// Каждый подписчик из снимка получает свою копию, если в его ящике
    /// есть место. Без подписчиков вызов ничего не делает. Никогда не
    /// блокируется и не завершается ошибкой.
    pub fn publish(
        &self,
        topic: &str,
        value: T,
    ) -> PublishReport {
        let snapshot = self.registry.snapshot(topic);
        let mut report = PublishReport::default();
        if snapshot.is_empty() {
            self.counters.record_publish(&report);
            tracing::trace!(topic, "no subscribers, message discarded");
            return report;
        }

        let mut abandoned = Vec::new();
        // последний живой подписчик получает само значение, без копии
        let mut pending = None;
        for entry in snapshot.iter() {
            if entry.is_closed() {
                report.skipped += 1;
                self.counters.record_closed_skip();
                continue;
            }
            if let Some(prev) = pending.replace(entry) {
                self.deliver_to(prev, value.clone(), &mut report, &mut abandoned);
            }
        }
        if let Some(last) = pending {
            self.deliver_to(last, value, &mut report, &mut abandoned);
        }
        drop(snapshot);

        for id in abandoned {
            self.reap(topic, id);
        }

        self.counters.record_publish(&report);
        tracing::trace!(
            topic,
            delivered = report.delivered,
            dropped = report.dropped,
            skipped = report.skipped,
            "message published"
        );
        report
    }

    fn deliver_to(
        &self,
        entry: &SubscriberEntry<T>,
        value: T,
        report: &mut PublishReport,
        abandoned: &mut Vec<SubscriberId>,
    ) {
        match entry.deliver(value) {
            Delivery::Delivered => report.delivered += 1,
            Delivery::Dropped => report.dropped += 1,
            // отписка между проверкой флага и отправкой
            Delivery::Closed => {
                report.skipped += 1;
                self.counters.record_closed_skip();
            }
            Delivery::Disconnected => {
                report.skipped += 1;
                abandoned.push(entry.id());
            }
        }
    }

    /// Удаляет подписку, приёмник которой выброшен потребителем.
    fn reap(
        &self,
        topic: &str,
        id: SubscriberId,
    ) {
        // отписка могла успеть раньше
        if let Ok(entry) = self.registry.remove(topic, id) {
            entry.close();
            self.counters.record_reaped();
            tracing::debug!(topic, subscriber = %id, "abandoned subscription reaped");
        }
    }

    /// Есть ли у темы хотя бы один подписчик.
    pub fn contains_topic(
        &self,
        topic: &str,
    ) -> bool {
        self.registry.contains(topic)
    }

    /// Количество тем с подписчиками.
    pub fn topic_count(&self) -> usize {
        self.registry.topic_count()
    }

    /// Количество подписок на тему.
    pub fn subscriber_count(
        &self,
        topic: &str,
    ) -> usize {
        self.registry.subscriber_count(topic)
    }

    /// Имена активных тем в произвольном порядке.
    pub fn topics(&self) -> Vec<Arc<str>> {
        self.registry.topics()
    }

    /// Текущая статистика.
    pub fn stats(&self) -> RelayStats {
        self.counters.snapshot(
            self.registry.topic_count(),
            self.registry.total_subscribers(),
        )
    }
}

impl<T> Default for Relay<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

impl<T> std::fmt::Debug for Relay<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("capacity", &self.capacity)
            .field("topics", &self.registry.topic_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::*;
    use crate::{RecvError, TryRecvError};

    /// Значение, считающее свои копии.
    #[derive(Debug)]
    struct Counted(Arc<AtomicUsize>);

    impl Clone for Counted {
        fn clone(&self) -> Self {
            self.0.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(&self.0))
        }
    }

    /// Тест проверяет сценарий "news": получение, отписка, конец потока
    /// и безопасная публикация после отписки.
    #[test]
    fn test_news_scenario() {
        let relay = Relay::new(4);
        let mut s1 = relay.subscribe("news").unwrap();
        let h1 = s1.id();

        relay.publish("news", "hello");
        assert_eq!(s1.try_recv(), Ok("hello"));

        relay.unsubscribe("news", h1).unwrap();
        assert_eq!(s1.try_recv(), Err(TryRecvError::Closed));

        let report = relay.publish("news", "hello2");
        assert_eq!(report.attempted(), 0);
        assert_eq!(s1.try_recv(), Err(TryRecvError::Closed));
    }

    /// Тест проверяет, что все подписчики темы получают сообщение
    /// ровно один раз.
    #[test]
    fn test_fan_out() {
        let relay = Relay::new(16);
        let mut subs: Vec<_> = (0..5).map(|_| relay.subscribe("multi").unwrap()).collect();

        let report = relay.publish("multi", 7u32);
        assert_eq!(report.delivered, 5);

        for sub in &mut subs {
            assert_eq!(sub.drain(), vec![7]);
        }
    }

    /// Тест проверяет изоляцию тем.
    #[test]
    fn test_topic_isolation() {
        let relay = Relay::new(4);
        let mut a = relay.subscribe("a").unwrap();
        let mut b = relay.subscribe("b").unwrap();

        relay.publish("a", 1);
        assert_eq!(a.drain(), vec![1]);
        assert!(b.drain().is_empty());
    }

    /// Тест проверяет, что при полном буфере сообщение теряется, а
    /// издатель не получает ошибки.
    #[test]
    fn test_drop_on_full() {
        let relay = Relay::new(1);
        let mut sub = relay.subscribe("t").unwrap();

        assert_eq!(relay.publish("t", 1).delivered, 1);
        assert_eq!(relay.publish("t", 2).dropped, 1);
        assert_eq!(sub.try_recv(), Ok(1));
        assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));

        assert_eq!(relay.publish("t", 3).delivered, 1);
        assert_eq!(sub.try_recv(), Ok(3));

        let stats = relay.stats();
        assert_eq!(stats.published, 3);
        assert_eq!(stats.delivered, 2);
        assert_eq!(stats.dropped, 1);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let relay = Relay::new(4);
        let report = relay.publish("nobody", 1);
        assert_eq!(report, PublishReport::default());
        assert!(!relay.contains_topic("nobody"));
    }

    #[test]
    fn test_empty_topic_rejected() {
        let relay: Relay<u8> = Relay::new(4);
        assert_eq!(relay.subscribe("").unwrap_err(), RelayError::InvalidTopic);
        assert_eq!(relay.topic_count(), 0);
    }

    /// Тест проверяет, что повторная отписка безопасна и не трогает
    /// остальных подписчиков.
    #[test]
    fn test_double_unsubscribe() {
        let relay = Relay::new(4);
        let sub = relay.subscribe("t").unwrap();
        let mut other = relay.subscribe("t").unwrap();

        relay.unsubscribe("t", sub.id()).unwrap();
        let err = relay.unsubscribe("t", sub.id()).unwrap_err();
        assert!(err.is_not_found());

        relay.publish("t", 5);
        assert_eq!(other.try_recv(), Ok(5));
    }

    #[test]
    fn test_unsubscribe_wrong_topic() {
        let relay: Relay<u8> = Relay::new(4);
        let sub = relay.subscribe("a").unwrap();
        assert_eq!(
            relay.unsubscribe("b", sub.id()).unwrap_err(),
            RelayError::TopicNotFound { topic: "b".into() }
        );
        assert_eq!(relay.subscriber_count("a"), 1);
    }

    /// Тест проверяет удаление пустой темы и её повторное создание.
    #[test]
    fn test_topic_garbage_collection() {
        let relay: Relay<u8> = Relay::new(4);
        let a = relay.subscribe("gc").unwrap();
        let b = relay.subscribe("gc").unwrap();

        relay.unsubscribe("gc", a.id()).unwrap();
        assert!(relay.contains_topic("gc"));
        relay.unsubscribe("gc", b.id()).unwrap();
        assert!(!relay.contains_topic("gc"));
        assert!(relay.topics().is_empty());

        let c = relay.subscribe("gc").unwrap();
        assert_eq!(relay.subscriber_count("gc"), 1);
        assert!(c.id() > b.id());
    }

    /// Тест проверяет, что брошенная подписка удаляется при следующей
    /// публикации.
    #[test]
    fn test_abandoned_subscription_reaped() {
        let relay = Relay::new(4);
        let dropped = relay.subscribe("t").unwrap();
        let mut kept = relay.subscribe("t").unwrap();
        drop(dropped);

        let report = relay.publish("t", 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(relay.subscriber_count("t"), 1);
        assert_eq!(relay.stats().reaped, 1);
        assert_eq!(kept.try_recv(), Ok(1));

        drop(kept);
        relay.publish("t", 2);
        assert!(!relay.contains_topic("t"));
    }

    /// Тест проверяет, что отписка во время доставки по старому снимку
    /// не приводит к доставке в закрытую подписку.
    #[test]
    fn test_closed_entry_in_snapshot_is_skipped() {
        let relay = Relay::new(4);
        let mut sub = relay.subscribe("t").unwrap();

        let snapshot = relay.registry.snapshot("t");
        relay.unsubscribe("t", sub.id()).unwrap();

        // отправитель ещё жив в снимке
        assert_eq!(sub.try_recv(), Err(TryRecvError::Empty));
        for entry in snapshot.iter() {
            assert_eq!(entry.deliver(9), Delivery::Closed);
        }
        drop(snapshot);

        assert_eq!(sub.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn test_independent_relays() {
        let first = Relay::new(4);
        let second: Relay<i32> = Relay::new(4);
        let mut a = first.subscribe("t").unwrap();
        let mut b = second.subscribe("t").unwrap();

        first.publish("t", 1);
        assert_eq!(a.drain(), vec![1]);
        assert!(b.drain().is_empty());
    }

    #[test]
    fn test_default_and_config() {
        let relay: Relay<u8> = Relay::default();
        assert_eq!(relay.capacity(), RelayConfig::default().capacity);

        let relay: Relay<u8> = Relay::from_config(&RelayConfig { capacity: 3 });
        assert_eq!(relay.capacity(), 3);
    }

    /// Тест проверяет параллельные публикации из нескольких потоков.
    #[test]
    fn test_concurrent_publishers() {
        let relay = Arc::new(Relay::new(10_000));
        let mut sub = relay.subscribe("t").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|p| {
                let relay = Arc::clone(&relay);
                thread::spawn(move || {
                    for i in 0..100u32 {
                        relay.publish("t", p * 1000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut got = sub.drain();
        got.sort_unstable();
        got.dedup();
        assert_eq!(got.len(), 800);
        assert_eq!(relay.stats().published, 800);
    }

    /// Тест проверяет, что значение копируется для всех подписчиков,
    /// кроме последнего.
    #[test]
    fn test_publish_moves_value_into_last_delivery() {
        let relay = Relay::new(4);
        let clones = Arc::new(AtomicUsize::new(0));
        let mut subs: Vec<_> = (0..3).map(|_| relay.subscribe("t").unwrap()).collect();

        let report = relay.publish("t", Counted(Arc::clone(&clones)));
        assert_eq!(report.delivered, 3);
        assert_eq!(clones.load(Ordering::SeqCst), 2);

        relay.publish("nobody", Counted(Arc::clone(&clones)));
        let _single = relay.subscribe("single").unwrap();
        relay.publish("single", Counted(Arc::clone(&clones)));
        assert_eq!(clones.load(Ordering::SeqCst), 2);

        for sub in &mut subs {
            assert_eq!(sub.drain().len(), 1);
        }
    }

    /// Тест проверяет пропуск закрытых записей снимка без копирования.
    #[test]
    fn test_closed_entries_skipped_before_clone() {
        let relay = Relay::new(4);
        let clones = Arc::new(AtomicUsize::new(0));
        let a = relay.subscribe("t").unwrap();
        let b = relay.subscribe("t").unwrap();
        let mut c = relay.subscribe("t").unwrap();

        let snapshot = relay.registry.snapshot("t");
        relay.unsubscribe("t", a.id()).unwrap();
        relay.unsubscribe("t", b.id()).unwrap();

        let mut report = PublishReport::default();
        let mut abandoned = Vec::new();
        let value = Counted(Arc::clone(&clones));
        for entry in snapshot.iter() {
            if entry.is_closed() {
                report.skipped += 1;
                continue;
            }
            relay.deliver_to(entry, value.clone(), &mut report, &mut abandoned);
        }
        assert_eq!(report.skipped, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(clones.load(Ordering::SeqCst), 1);
        drop(snapshot);

        assert_eq!(c.drain().len(), 1);
        assert!(abandoned.is_empty());
    }

    /// Тест проверяет, что при ёмкости 0 ожидающий приёмник получает
    /// значение, а без ожидания оно теряется.
    #[test]
    fn test_zero_capacity_delivers_to_blocked_receiver() {
        let relay: Arc<Relay<u32>> = Arc::new(Relay::new(0));
        let mut sub = relay.subscribe("t").unwrap();

        assert_eq!(relay.publish("t", 1).dropped, 1);

        let reader = thread::spawn(move || {
            let got = sub.blocking_recv();
            (got, sub)
        });

        let mut delivered = false;
        for _ in 0..1000 {
            if relay.publish("t", 7).delivered == 1 {
                delivered = true;
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert!(delivered);

        let (got, mut sub) = reader.join().unwrap();
        assert_eq!(got, Ok(7));
        assert_eq!(relay.publish("t", 8).dropped, 1);

        relay.unsubscribe("t", sub.id()).unwrap();
        assert_eq!(sub.blocking_recv(), Err(RecvError::Closed));
    }
}
