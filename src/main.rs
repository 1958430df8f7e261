use eyre::{eyre, Result};
use sms_scheduler::clock::SystemClock;
use sms_scheduler::config::Config;
use sms_scheduler::persistence::{MemoryPersistence, PersistencePort, S3Config, S3Persistence};
use sms_scheduler::scheduler::{Scheduler, SchedulerConfig};
use sms_scheduler::send::MockSendPort;
use sms_scheduler::{api, api::AppState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| eyre!(e))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        bucket = %config.s3_bucket,
        local = config.is_local(),
        dry_run = config.dry_run,
        once = config.once,
        "starting sms-retry-scheduler"
    );

    let persistence: Arc<dyn PersistencePort> = if config.dry_run {
        tracing::warn!("--dry-run: using an in-memory Persistence Port, nothing is durable");
        Arc::new(MemoryPersistence::new())
    } else {
        let s3_config = S3Config {
            bucket: config.s3_bucket.clone(),
            state_prefix: config.s3_state_prefix.clone(),
            success_prefix: config.s3_success_prefix.clone(),
            failed_prefix: config.s3_failed_prefix.clone(),
            region: Some(config.aws_region.clone()),
            endpoint_url: config.aws_endpoint_url.clone(),
        };
        Arc::new(
            S3Persistence::connect(s3_config)
                .await
                .map_err(|e| eyre!(e))?,
        )
    };

    let send_port = Arc::new(MockSendPort::default());
    let clock = Arc::new(SystemClock);
    let scheduler_config = SchedulerConfig {
        bucket: config.s3_bucket.clone(),
        state_prefix: config.s3_state_prefix.clone(),
        success_prefix: config.s3_success_prefix.clone(),
        failed_prefix: config.s3_failed_prefix.clone(),
    };
    let scheduler = Scheduler::new(persistence, send_port, clock, scheduler_config);

    if config.once {
        scheduler.start();
        scheduler.wakeup();
        scheduler.stop();
        tracing::info!("single recovery+drain pass complete");
        return Ok(());
    }

    scheduler.start();

    let addr = format!("{}:{}", config.api_host, config.api_port);
    let state = AppState {
        scheduler: scheduler.clone(),
    };
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "admin facade listening");
    axum::serve(listener, app).await?;

    scheduler.stop();
    Ok(())
}
