mod alerts;
mod collectors;
mod config;
mod notify;
mod report;
mod run;
mod store;

use clap::Parser;
use collectors::system::SysinfoSource;
use config::Config;
use notify::NotificationRouter;
use run::HealthCheck;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostcheck")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Repeat the check on this period (e.g. `30s`, `5m`) until Ctrl+C.
    #[arg(long, value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Keep every notification channel off for this invocation.
    #[arg(long)]
    no_notify: bool,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            std::process::exit(1);
        }
    };
    if cli.no_notify {
        cfg.email_alert.enabled = false;
        cfg.webhook_alert.enabled = false;
    }

    let router = NotificationRouter::from_config(&cfg);
    info!(
        report_dir = %cfg.report_dir.display(),
        channels = ?router.channel_names(),
        services = cfg.services_to_check.len(),
        "запуск hostcheck"
    );
    let check = HealthCheck::new(Box::new(SysinfoSource::new()), &cfg, router);

    match cli.interval {
        None => match check.run().await {
            Ok(summary) => {
                info!(healthy = summary.is_healthy(), "запуск завершён");
                println!("{summary}");
            }
            Err(err) => {
                error!(error = %err, phase = %err.phase(), "запуск прерван");
                std::process::exit(1);
            }
        },
        Some(period) => run_periodically(&check, period).await,
    }
}

async fn run_periodically(check: &HealthCheck, period: Duration) {
    info!(interval = %humantime::format_duration(period), "периодический режим");
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    error!(error = %err, "не удалось дождаться Ctrl+C");
                }
                info!("получен Ctrl+C, выполняется остановка");
                break;
            }
            _ = ticker.tick() => {
                match check.run().await {
                    Ok(summary) => println!("{summary}"),
                    Err(err) => {
                        warn!(error = %err, phase = %err.phase(), "запуск прерван, ждём следующий");
                    }
                }
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
