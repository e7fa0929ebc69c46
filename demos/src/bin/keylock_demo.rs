//! Демонстрация блокировок по ключу
//!
//! Несколько рабочих потоков по очереди захватывают один и тот же ключ,
//! а поток с другим ключом работает параллельно с ними.

use std::{sync::Arc, thread, time::Duration};

use anyhow::{anyhow, Result};
use clap::Parser;
use pubrelay::{init_logging, KeyedMutex, LoggingConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "keylock_demo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "pubrelay demo: workers serialized on a shared key", long_about = None)]
struct Cli {
    /// Общий ключ, за который соревнуются рабочие
    #[arg(short, long, default_value = "/tmp/file.txt")]
    key: String,
    /// Количество рабочих на общем ключе
    #[arg(short, long, default_value = "3")]
    workers: usize,
    /// Время удержания блокировки, мс
    #[arg(long, default_value = "100")]
    hold_ms: u64,
    /// Уровень логирования
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&LoggingConfig {
        level: cli.log_level.clone(),
        ..LoggingConfig::default()
    })?;

    let locks = Arc::new(KeyedMutex::new());
    let hold = Duration::from_millis(cli.hold_ms);

    let mut handles = Vec::new();
    for worker in 0..cli.workers {
        let locks = Arc::clone(&locks);
        let key = cli.key.clone();
        handles.push(thread::spawn(move || {
            let guard = locks.lock(&key);
            println!("worker {worker} holds {}", guard.key());
            thread::sleep(hold);
            println!("worker {worker} releases {}", guard.key());
            guard.release();
        }));
    }

    let independent = {
        let locks = Arc::clone(&locks);
        let key = format!("{}.bak", cli.key);
        thread::spawn(move || {
            let guard = locks.lock(&key);
            println!("independent worker holds {}", guard.key());
            thread::sleep(hold);
        })
    };

    handles.push(independent);
    for handle in handles {
        handle
            .join()
            .map_err(|_| anyhow!("worker thread panicked"))?;
    }

    let pruned = locks.prune_idle();
    info!(pruned, remaining = locks.len(), "all workers finished");
    Ok(())
}
