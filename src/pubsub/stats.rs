use std::sync::atomic::{AtomicU64, Ordering};

/// Итог одного вызова `publish`.
///
/// Чисто информационный: издатель не обязан его проверять, потеря
/// сообщения медленным подписчиком ошибкой не считается.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Сколько подписчиков получили значение.
    pub delivered: usize,
    /// Сколько подписчиков пропущено из-за полного буфера.
    pub dropped: usize,
    /// Сколько записей снимка оказались уже отписанными или брошенными.
    pub skipped: usize,
}

impl PublishReport {
    /// Общее число подписчиков в снимке.
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.skipped
    }
}

/// Снимок статистики реле.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Общее количество вызовов `publish`.
    pub published: u64,
    /// Количество успешно положенных в ящики значений.
    pub delivered: u64,
    /// Количество значений, потерянных из-за полного буфера.
    pub dropped: u64,
    /// Доставки, пропущенные из-за отписки во время публикации.
    pub closed_skips: u64,
    /// Подписки, удалённые после того, как потребитель выбросил приёмник.
    pub reaped: u64,
    /// Текущее количество тем.
    pub topics: usize,
    /// Текущее количество подписок во всех темах.
    pub subscribers: usize,
}

/// Атомарные счётчики реле.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) published: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) closed_skips: AtomicU64,
    pub(crate) reaped: AtomicU64,
}

impl Counters {
    pub(crate) fn record_publish(
        &self,
        report: &PublishReport,
    ) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_closed_skip(&self) {
        self.closed_skips.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reaped(&self) {
        self.reaped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        topics: usize,
        subscribers: usize,
    ) -> RelayStats {
        RelayStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            closed_skips: self.closed_skips.load(Ordering::Relaxed),
            reaped: self.reaped.load(Ordering::Relaxed),
            topics,
            subscribers,
        }
    }
}
