use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use fastbreak_backend::bus::OutboxBus;
use fastbreak_backend::config::Config;
use fastbreak_backend::consumer::AnnouncementConsumer;
use fastbreak_backend::poller::ConfirmationPoller;
use fastbreak_backend::scheduler::SettlementScheduler;
use fastbreak_backend::scores::DbScoreSource;
use fastbreak_backend::solana::SolanaOracleGateway;
use fastbreak_backend::state::AppState;
use fastbreak_backend::store::PgSettlementStore;
use fastbreak_backend::winner::WinnerDeterminer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fastbreak_backend=debug")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("connecting to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    let store = Arc::new(PgSettlementStore::new(pool.clone()));
    let scores = Arc::new(DbScoreSource::new(pool.clone()));
    let bus = Arc::new(OutboxBus::new(pool.clone()));
    let gateway =
        Arc::new(SolanaOracleGateway::from_config(&config).context("building oracle gateway")?);

    let determiner = Arc::new(WinnerDeterminer::new(
        store.clone(),
        scores.clone(),
        bus.clone(),
        config.winners_topic.clone(),
    ));

    let consumer = Arc::new(AnnouncementConsumer::new(
        store.clone(),
        gateway.clone(),
        bus.clone(),
        config.winners_topic.clone(),
    ));
    tokio::spawn(consumer.run(bus.clone()));

    let poller = Arc::new(ConfirmationPoller::new(
        store.clone(),
        gateway,
        bus.clone(),
        config.winners_topic.clone(),
        config.confirmation_timeout(),
        config.poll_interval(),
    ));
    tokio::spawn(poller.run());

    let scheduler = Arc::new(SettlementScheduler::new(
        determiner.clone(),
        scores,
        config.announcement_month,
        config.announcement_day,
        config.announcement_hour,
    ));
    scheduler.start();

    let state = AppState {
        store,
        bus,
        determiner,
        winners_topic: config.winners_topic.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("binding {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "server running");

    axum::serve(listener, fastbreak_backend::app(state))
        .await
        .context("serving")?;

    Ok(())
}
