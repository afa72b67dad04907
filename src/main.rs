mod collectors;
mod config;
mod publisher;
mod state;

use clap::Parser;
use collectors::{CollectError, Sampler};
use config::Config;
use publisher::{Connector, PostgresConnector, PublishError, Publisher};
use state::{CpuUsageTracker, MetricsSnapshot};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

const CPU_WARMUP: Duration = Duration::from_millis(250);
const ERROR_PENALTY: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "metrics-agent")]
#[command(version)]
struct Cli {
    /// Optional YAML file; environment variables take precedence over it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    /// Collect one snapshot, print it as JSON and exit without touching the database.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Error)]
enum IterationError {
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("не удалось вывести замер: {0}")]
    Output(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match Config::load(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };

    let sampler = Sampler::from_config(&cfg);
    let mut cpu = match sampler.read_cpu_times() {
        Ok(baseline) => CpuUsageTracker::new(baseline),
        Err(err) => {
            error!(error = %err, "не удалось снять начальные показания CPU");
            std::process::exit(1);
        }
    };
    tokio::time::sleep(CPU_WARMUP).await;

    if cli.once {
        if let Err(err) = print_snapshot(&sampler, &mut cpu) {
            error!(error = %err, "не удалось снять замер");
            std::process::exit(1);
        }
        return;
    }

    let interval = cfg.interval();
    info!(
        db_host = %cfg.database.host,
        db_port = cfg.database.port,
        db_name = %cfg.database.name,
        interval = %humantime::format_duration(interval),
        disk_path = %cfg.disk_path,
        "запуск metrics-agent"
    );

    let mut publisher = Publisher::new(PostgresConnector::new(&cfg.database));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let result = run_iteration(&sampler, &mut cpu, &mut publisher).await;
        if let Err(err) = &result {
            error!(error = %err, "ошибка итерации сбора метрик");
        }
        let pause = pause_after(&result, interval);

        tokio::select! {
            res = &mut shutdown => {
                if let Err(err) = res {
                    error!(error = %err, "не удалось дождаться Ctrl+C");
                }
                info!("получен сигнал остановки, завершение работы");
                break;
            }
            _ = tokio::time::sleep(pause) => {}
        }
    }

    publisher.close().await;
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_iteration<C: Connector>(
    sampler: &Sampler,
    cpu: &mut CpuUsageTracker,
    publisher: &mut Publisher<C>,
) -> Result<(), IterationError> {
    let snapshot = sampler.collect(cpu)?;
    publisher.publish(&snapshot).await?;
    debug!(
        cpu_usage_percent = ?snapshot.cpu_usage_percent,
        ram_usage_percent = ?snapshot.memory.ram_usage_percent,
        disk_usage_percent = ?snapshot.disk.usage_percent,
        net_rx_mb = snapshot.net.rx_mb,
        net_tx_mb = snapshot.net.tx_mb,
        "замер записан"
    );
    Ok(())
}

/// A failed iteration adds a fixed penalty on top of the regular interval.
fn pause_after(result: &Result<(), IterationError>, interval: Duration) -> Duration {
    match result {
        Ok(()) => interval,
        Err(_) => ERROR_PENALTY + interval,
    }
}

fn print_snapshot(sampler: &Sampler, cpu: &mut CpuUsageTracker) -> Result<(), IterationError> {
    let snapshot = sampler.collect(cpu)?;
    write_snapshot(std::io::stdout().lock(), &snapshot)
}

fn write_snapshot<W: Write>(mut out: W, snapshot: &MetricsSnapshot) -> Result<(), IterationError> {
    serde_json::to_writer_pretty(&mut out, snapshot)?;
    writeln!(out).map_err(serde_json::Error::io)?;
    Ok(())
}
