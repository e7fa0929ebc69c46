//! Демонстрация реле
//!
//! Подписчик получает одно сообщение сразу, второе от фонового издателя
//! через паузу, а затем поток закрывается отпиской.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use pubrelay::{init_logging, Relay, Settings};
use tracing::info;

#[derive(Parser)]
#[command(name = "relay_demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pubrelay demo: publish, delayed publish and unsubscribe", long_about = None)]
struct Cli {
    /// Путь к файлу конфигурации (TOML/YAML/JSON)
    #[arg(short, long, env = "PUBRELAY_CONFIG")]
    config: Option<PathBuf>,
    /// Переопределяет ёмкость ящика из конфигурации
    #[arg(long)]
    capacity: Option<usize>,
    /// Тема для подписки и публикации
    #[arg(short, long, default_value = "news")]
    topic: String,
    /// Пауза перед отложенной публикацией, мс
    #[arg(long, default_value = "200")]
    publish_delay_ms: u64,
    /// Пауза перед отпиской, мс
    #[arg(long, default_value = "1000")]
    unsubscribe_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings =
        Settings::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(capacity) = cli.capacity {
        settings.relay.capacity = capacity;
    }
    init_logging(&settings.logging).context("failed to initialize logging")?;

    let relay: Arc<Relay<String>> = Arc::new(Relay::from_config(&settings.relay));
    let mut sub = relay
        .subscribe(&cli.topic)
        .with_context(|| format!("failed to subscribe to {}", cli.topic))?;
    info!(topic = %cli.topic, id = %sub.id(), "subscribed");

    relay.publish(&cli.topic, "breaking".to_string());

    let publisher = {
        let relay = Arc::clone(&relay);
        let topic = cli.topic.clone();
        let delay = Duration::from_millis(cli.publish_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let report = relay.publish(&topic, "later".to_string());
            info!(delivered = report.delivered, dropped = report.dropped, "delayed publish");
        })
    };

    let unsubscriber = {
        let relay = Arc::clone(&relay);
        let topic = cli.topic.clone();
        let id = sub.id();
        let delay = Duration::from_millis(cli.unsubscribe_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            relay.unsubscribe(&topic, id)
        })
    };

    while let Ok(message) = sub.recv().await {
        println!("{}: {message}", cli.topic);
    }
    println!("{}: stream closed", cli.topic);

    publisher.await.context("publisher task failed")?;
    unsubscriber
        .await
        .context("unsubscribe task failed")?
        .context("unsubscribe failed")?;

    let stats = relay.stats();
    info!(
        published = stats.published,
        delivered = stats.delivered,
        dropped = stats.dropped,
        topics = stats.topics,
        "relay finished"
    );
    Ok(())
}
