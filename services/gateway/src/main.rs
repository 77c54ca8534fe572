use std::sync::Arc;

use anyhow::Context;
use gateway::auth::AuthKeys;
use gateway::bus::NatsBus;
use gateway::config::GatewayConfig;
use gateway::hub::Hub;
use gateway::ingest::EventIngestor;
use gateway::publisher::CommandPublisher;
use gateway::rate_limit::RateLimiter;
use gateway::relay::spawn_redis_relays;
use gateway::router::create_router;
use gateway::shutdown::{self, ShutdownTrigger};
use gateway::state::AppState;
use gateway::store::{MemoryStore, PgStore, Store};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = GatewayConfig::from_env().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Gateway service");

    let (trigger, shutdown) = shutdown::channel();

    let (hub, hub_loop) = Hub::new(config.hub.clone());
    let hub_task = tokio::spawn(hub_loop.run(shutdown.clone()));

    let store: Arc<dyn Store> = match &config.database.url {
        Some(url) => Arc::new(
            PgStore::connect(url, config.database.max_connections)
                .await
                .context("Failed to connect to database")?,
        ),
        None => {
            warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let bus = NatsBus::connect(&config.bus.nats_url).await?;
    let events = bus.subscribe(&config.bus.event_subject).await?;

    let ingestor = EventIngestor::new(Arc::clone(&store), hub.clone());
    let ingest_stats = ingestor.stats();
    let ingest_task = tokio::spawn(ingestor.run(events, shutdown.clone()));

    let relay_tasks = spawn_redis_relays(&config.market_data, &hub, &shutdown)
        .await
        .context("Failed to start market data relays")?;
    info!(relays = relay_tasks.len(), "Market data relays running");

    let state = AppState {
        hub,
        publisher: Arc::new(CommandPublisher::new(
            Arc::new(bus),
            config.bus.command_subject.clone(),
        )),
        store,
        auth: AuthKeys::from_secret(config.jwt_secret.as_bytes()),
        rate_limiter: Arc::new(RateLimiter::new(config.rate_limit)),
        ingest_stats,
    };
    let app = create_router(state);

    let addr = config.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    tokio::spawn(trigger_on_signal(trigger));

    let mut server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.wait().await })
        .await?;

    let _ = ingest_task.await;
    for relay in relay_tasks {
        let _ = relay.await;
    }
    let _ = hub_task.await;

    info!("Gateway stopped");
    Ok(())
}

async fn trigger_on_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    trigger.trigger();
}
