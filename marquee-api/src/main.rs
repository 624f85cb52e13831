use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use marquee_api::{app, worker, AppState, AuthConfig, ChannelBroadcaster};
use marquee_booking::{BookingFinalizer, SeatLockManager};
use marquee_core::{BookingRepository, Clock, LockStore, NotificationDispatcher, SystemClock, TracingNotifier};
use marquee_store::app_config::{Config, LockBackend};
use marquee_store::{DbClient, InMemoryBookingRepository, InMemoryLockStore, PgBookingRepository, RedisLockStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,marquee_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let lock_store: Arc<dyn LockStore> = match config.lock_store.backend {
        LockBackend::Redis => {
            let url = config
                .lock_store
                .redis_url
                .as_deref()
                .context("lock_store.redis_url is required for the redis backend")?;
            let timeout = Duration::from_millis(config.lock_store.operation_timeout_ms);
            Arc::new(RedisLockStore::new(url, timeout).context("Invalid Redis URL")?)
        }
        LockBackend::Memory => {
            tracing::warn!("Using in-memory seat locks, holds are not shared between instances");
            Arc::new(InMemoryLockStore::with_clock(clock.clone()))
        }
    };

    let bookings: Arc<dyn BookingRepository> = match DbClient::from_config(&config.database)
        .await
        .context("Failed to connect to Postgres")?
    {
        Some(db) => {
            db.migrate().await.context("Failed to run migrations")?;
            Arc::new(PgBookingRepository::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("No database.url configured, bookings are kept in memory");
            Arc::new(InMemoryBookingRepository::new())
        }
    };

    // SSE Broadcast Channel
    let (sse_tx, _) = tokio::sync::broadcast::channel(256);

    let locks = Arc::new(SeatLockManager::new(lock_store, clock.clone()));
    let finalizer = Arc::new(
        BookingFinalizer::new(
            bookings,
            locks,
            notifier(&config)?,
            Arc::new(ChannelBroadcaster::new(sse_tx.clone())),
            clock,
        )
        .with_cancellation_cutoff(config.booking_rules.cancellation_cutoff_hours),
    );

    tokio::spawn(worker::start_sweep_worker(
        finalizer.clone(),
        Duration::from_secs(config.booking_rules.sweep_interval_seconds),
        Duration::from_secs(config.booking_rules.pending_payment_timeout_seconds),
    ));

    let state = AppState::new(
        finalizer,
        sse_tx,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            webhook_secret: config.auth.webhook_secret.clone(),
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(feature = "kafka")]
fn notifier(config: &Config) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    match &config.kafka {
        Some(kafka) => {
            let producer = marquee_store::EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Ok(Arc::new(marquee_store::KafkaNotifier::new(producer, kafka.notification_topic.clone())))
        }
        None => Ok(Arc::new(TracingNotifier)),
    }
}

#[cfg(not(feature = "kafka"))]
fn notifier(config: &Config) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but this build lacks the `kafka` feature, notifications go to the log");
    }
    Ok(Arc::new(TracingNotifier))
}
