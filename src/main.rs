use axum::serve;
use clap::Parser;
use hoststat::collectors::SysinfoProbe;
use hoststat::config::Config;
use hoststat::health::HealthSnapshot;
use hoststat::http;
use hoststat::metrics::Metrics;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hoststat")]
#[command(version)]
struct Cli {
    #[arg(long, default_value = "./config.yaml")]
    config: String,
    #[arg(long)]
    print_default_config: bool,
    /// Print one snapshot as JSON and exit (0 healthy, 2 unhealthy).
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return ExitCode::SUCCESS;
    }

    let cfg = match Config::load_from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "не удалось загрузить конфигурацию");
            return ExitCode::FAILURE;
        }
    };

    let snapshot = HealthSnapshot::new(SysinfoProbe::new(), cfg.thresholds, cfg.disk_path.clone())
        .with_addresses(cfg.expose_addresses);

    if cli.once {
        return print_once(&snapshot).await;
    }

    info!(
        listen = %cfg.listen,
        interval_secs = cfg.interval_secs,
        disk_path = %cfg.disk_path.display(),
        "запуск hoststat"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "не удалось инициализировать метрики");
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = {
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        let snapshot = snapshot.clone();
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let app = http::build_router(metrics, snapshot);
            let addr: SocketAddr = match cfg.listen.parse() {
                Ok(addr) => addr,
                Err(err) => {
                    error!(error = %err, listen = %cfg.listen, "некорректный адрес listen");
                    return;
                }
            };

            let listener = match TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(err) => {
                    error!(error = %err, "не удалось запустить HTTP-сервер");
                    return;
                }
            };

            let server = serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            });

            if let Err(err) = server.await {
                error!(error = %err, "ошибка HTTP-сервера");
            }
        })
    };

    let sampler_task = {
        let metrics = metrics.clone();
        let mut shutdown = shutdown_rx.clone();
        let interval = Duration::from_secs(cfg.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut was_healthy = true;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("получен сигнал остановки цикла опроса");
                        break;
                    }
                    _ = ticker.tick() => {
                        match snapshot.get_stats(None).await {
                            Ok(stats) => {
                                metrics.update_from_snapshot(&stats);
                                if stats.is_healthy {
                                    if !was_healthy {
                                        info!("хост снова в норме");
                                    }
                                    debug!(cpu_utilization = stats.cpu_utilization, "опрос хоста выполнен");
                                } else {
                                    warn!(
                                        cpu_utilization = stats.cpu_utilization,
                                        available_memory = stats.available_memory,
                                        disk_space = stats.disk_space,
                                        "хост превысил пороговые значения"
                                    );
                                }
                                was_healthy = stats.is_healthy;
                            }
                            Err(err) => {
                                metrics.inc_sample_error("sampler");
                                warn!(error = %err, "опрос хоста не выполнен");
                            }
                        }
                    }
                }
            }
        })
    };

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "не удалось дождаться Ctrl+C");
    }
    info!("получен Ctrl+C, выполняется остановка");

    let _ = shutdown_tx.send(true);

    let _ = sampler_task.await;
    let _ = http_task.await;
    ExitCode::SUCCESS
}

async fn print_once(snapshot: &HealthSnapshot<SysinfoProbe>) -> ExitCode {
    let stats = match snapshot.get_stats(None).await {
        Ok(stats) => stats,
        Err(err) => {
            error!(error = %err, "не удалось получить состояние хоста");
            return ExitCode::FAILURE;
        }
    };

    match serde_json::to_string_pretty(&stats) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            error!(error = %err, "не удалось сериализовать снимок");
            return ExitCode::FAILURE;
        }
    }

    if stats.is_healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
