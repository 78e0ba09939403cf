use std::sync::Arc;
use std::time::Duration;

use analysis_orchestrator::TaskService;
use anyhow::{Context, Result};
use bybit_client::BybitClient;
use factor_engine::FactorRegistry;
use llm_client::LlmClient;
use market_store::SqliteMarketStore;
use news_feed::NewsFeedClient;
use task_registry::TaskStatus;
use task_scheduler::TaskScheduler;
use tokio::signal::unix::SignalKind;
use tokio::time;

mod config;

use config::AppConfig;

/// How long shutdown waits for cancelled tasks to reach a terminal state
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting crypto factor analysis daemon");

    // 2. Configuration
    let config = AppConfig::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Exchange: {} ({} req/min)", config.bybit_base_url, config.bybit_rate_limit);
    tracing::info!("  News: {}", config.news_api_url);
    tracing::info!("  LLM: {} (model {})", config.llm_base_url, config.llm_model);
    tracing::info!(
        "  Schedule: {} UTC daily, enabled={}, run on start={}",
        config.schedule_time_utc,
        config.scheduler_enabled,
        config.run_on_start
    );
    if config.news_api_key.is_none() {
        tracing::warn!("NEWS_API_KEY not set, news requests are unauthenticated");
    }
    if config.llm_api_key.is_none() {
        tracing::warn!("LLM_API_KEY not set, scoring requests are unauthenticated");
    }

    // 3. Collaborators
    let store = SqliteMarketStore::new(&config.database_url, config.history_backfill_days)
        .await
        .with_context(|| format!("Failed to open market store at {}", config.database_url))?;
    tracing::info!("Market store ready");

    let exchange = BybitClient::with_rate_limit(&config.bybit_base_url, config.bybit_rate_limit);
    let news = NewsFeedClient::new(&config.news_api_url, config.news_api_key.clone());
    let scorer = LlmClient::new(config.llm_config()).context("Failed to build LLM client")?;

    let factors = FactorRegistry::with_defaults();
    tracing::info!(
        "Factor registry initialized ({} factors: {})",
        factors.len(),
        factors
            .list()
            .iter()
            .map(|f| f.id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    // 4. Task service + scheduler
    let service = TaskService::new(
        Arc::new(exchange),
        Arc::new(store),
        Arc::new(news),
        Arc::new(scorer),
        factors,
        config.service_config(),
    );

    let scheduler = Arc::new(TaskScheduler::new(service.clone(), config.scheduler_config()));
    let scheduler_handle = scheduler.start();

    if config.run_on_start {
        tracing::info!("RUN_ON_START set, running one cycle now");
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move {
            scheduler.run_once().await;
        });
    }

    // 5. Heartbeat loop with graceful shutdown (SIGINT + SIGTERM)
    let mut heartbeat = time::interval(Duration::from_secs(config.heartbeat_seconds.max(1)));
    heartbeat.tick().await;
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                log_heartbeat(&scheduler, &service);
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, exiting gracefully...");
                break;
            }
        }
    }

    // 6. Shutdown: stop the loop, cancel in-flight work, give runners a moment to finalize
    scheduler.stop();
    scheduler.stop_current();
    let cancelled = service.registry().cancel_all();
    if cancelled > 0 {
        tracing::info!("Requested cancellation of {} tasks", cancelled);
        wait_for_idle(&service, SHUTDOWN_GRACE).await;
    }

    if let Some(handle) = scheduler_handle {
        if let Err(e) = handle.await {
            tracing::warn!("Scheduler loop ended abnormally: {}", e);
        }
    }

    tracing::info!("Analysis daemon shut down.");
    Ok(())
}

fn log_heartbeat(scheduler: &TaskScheduler, service: &TaskService) {
    let status = scheduler.status();
    let counts = service
        .registry()
        .status_counts()
        .iter()
        .map(|(status, n)| format!("{}={}", status, n))
        .collect::<Vec<_>>()
        .join(" ");

    tracing::info!(
        "Heartbeat | scheduler running={} enabled={} next_run={} | tasks: {}",
        status.running,
        status.enabled,
        status
            .next_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string()),
        if counts.is_empty() { "none".to_string() } else { counts }
    );
    for current in [&status.current_analysis_task, &status.current_news_task].into_iter().flatten() {
        tracing::info!(
            "  Scheduled task {}: {} {:.0}% {}",
            current.task_id,
            current
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            current.progress.unwrap_or(0.0) * 100.0,
            current.message.as_deref().unwrap_or("")
        );
    }
}

async fn wait_for_idle(service: &TaskService, grace: Duration) {
    let deadline = time::Instant::now() + grace;
    loop {
        let counts = service.registry().status_counts();
        let active = counts.get(&TaskStatus::Pending).copied().unwrap_or(0)
            + counts.get(&TaskStatus::Running).copied().unwrap_or(0);
        if active == 0 {
            return;
        }
        if time::Instant::now() >= deadline {
            tracing::warn!("{} tasks still active after {:?}, exiting anyway", active, grace);
            return;
        }
        time::sleep(Duration::from_millis(200)).await;
    }
}
