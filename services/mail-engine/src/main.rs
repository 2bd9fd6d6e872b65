use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use mail_engine::adapters::http_mailer::HttpEmailSender;
use mail_engine::adapters::postgres::PgQueryExecutor;
use mail_engine::config::Config;
use mail_engine::database;
use mail_engine::store::postgres::PgReportStore;
use mail_engine::{ExecutionTimeouts, ScheduleSweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Mail Engine starting...");

    let config = Config::from_env()?;

    info!(
        sweep_interval_seconds = config.sweep.interval_seconds,
        "Configuration loaded"
    );

    let pool = database::create_pool(&config.database).await?;

    let store = Arc::new(PgReportStore::new(pool.clone()));
    let executor = Arc::new(PgQueryExecutor::new(pool));
    let mailer = Arc::new(HttpEmailSender::new(&config.mailer));

    let timeouts = ExecutionTimeouts {
        query: Duration::from_secs(config.sweep.query_timeout_seconds),
        send: Duration::from_secs(config.sweep.send_timeout_seconds),
    };

    let sweeper = ScheduleSweeper::new(store, executor, mailer, timeouts);

    info!("Mail Engine initialized successfully");

    let mut ticker = tokio::time::interval(config.sweep.interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let outcomes = sweeper.sweep_due_reports(Utc::now()).await;
        if !outcomes.is_empty() {
            let failures = outcomes.iter().filter(|o| !o.success).count();
            if failures > 0 {
                error!(
                    processed = outcomes.len(),
                    failures = failures,
                    "sweep completed with failures"
                );
            } else {
                info!(processed = outcomes.len(), "sweep completed");
            }
        }
    }
}
