use std::sync::Arc;
use std::time::Duration;

use courier_common::config::AppConfig;
use courier_common::{db, redis_pool};
use courier_engine::{Orchestrator, PgRunStore, RunDriver, RunStore, SystemClock};
use courier_fetcher::PageFetcher;
use courier_notifier::TelegramNotifier;
use courier_scheduler::guard::RedisStartGuard;
use courier_scheduler::launcher::Launcher;
use courier_scheduler::trigger::DailyTrigger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "courier_scheduler=info,courier_engine=info,courier_fetcher=info,courier_notifier=info"
                    .into()
            }),
        )
        .json()
        .init();

    tracing::info!("StripCourier scheduler starting...");

    let config = AppConfig::from_env()?;

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::migrate(&pool).await?;
    let redis = redis_pool::create_redis_pool(&config.redis_url).await?;

    let fetcher = PageFetcher::new(
        config.content_source_url.clone(),
        Duration::from_secs(config.fetch_timeout_secs),
    )?;
    let notifier = TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        &config.notify_chat_id,
        &config.fallback_chat_id,
        Duration::from_secs(config.delivery_timeout_secs),
    )?
    .redirect_to_fallback(config.redirect_to_fallback);

    let store: Arc<dyn RunStore> = Arc::new(PgRunStore::new(pool));
    let clock = Arc::new(SystemClock);
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(fetcher),
        Arc::new(notifier),
        store,
        clock.clone(),
    ));
    let driver = Arc::new(RunDriver::new(
        orchestrator,
        config.resume_max_attempts,
        Duration::from_secs(config.resume_backoff_secs),
    ));

    // Runs left unfinished by a previous process continue by replay.
    driver.resume_unfinished().await?;

    let trigger = DailyTrigger::new(config.trigger_cron.clone(), config.trigger_offset()?);
    let launcher = Arc::new(Launcher::new(
        trigger.clone(),
        Arc::new(RedisStartGuard::new(redis)),
        driver,
        clock,
        config.poll_policy(),
    ));

    if config.run_on_startup {
        if let Some(run_id) = launcher.fire_now().await? {
            tracing::info!(run_id = %run_id, "Startup run launched");
        }
    }

    let mut scheduler = trigger.scheduler(launcher).await?;
    scheduler.start().await?;
    tracing::info!(cron = trigger.cron(), "Trigger scheduled");

    // Run until Ctrl+C
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");
    scheduler.shutdown().await?;

    tracing::info!("StripCourier scheduler stopped.");
    Ok(())
}
