//! Ticketing reservation core HTTP server.

use boxoffice::accounting::{ResourceAccounting, SupplyConfig};
use boxoffice::config::Config;
use boxoffice::ledger::batcher::{BatcherConfig, LedgerBatcher};
use boxoffice::ledger::memory::MemoryLedger;
use boxoffice::ledger::LedgerClient;
use boxoffice::mockpay::MockPay;
use boxoffice::orchestrator::{Orchestrator, OrchestratorConfig};
use boxoffice::providers::{OrderStore, RateLimiter, SessionStore};
use boxoffice::server::{build_router, AppState};
use boxoffice::stores::{
    MemoryOrderStore, MemoryRateLimiter, MemorySessionStore, PostgresOrderStore,
    RedisRateLimiter, RedisSessionStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=info,tower_http=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        host = %config.server.host,
        port = config.server.port,
        hold_timeout = config.checkout.hold_timeout_seconds,
        "starting reservation core"
    );

    // Ledger: embedded engine behind the auto-batcher. A deployment with an
    // external ledger provides a remote LedgerClient behind the same seam.
    if let Some(address) = &config.ledger.address {
        info!(address = %address, "external ledger configured; embedded engine serves this process");
    }
    let engine: Arc<dyn LedgerClient> = MemoryLedger::new();
    let batcher = LedgerBatcher::spawn(
        engine,
        BatcherConfig {
            max_batch: config.ledger.max_batch,
            max_wait: Duration::from_micros(config.ledger.max_wait_micros),
            queue_depth: config.ledger.queue_depth,
        },
    );

    let accounting = Arc::new(ResourceAccounting::new(
        batcher,
        SupplyConfig {
            class_a: config.checkout.ticket_supply_a,
            class_b: config.checkout.ticket_supply_b,
            goodies: config.checkout.goodie_supply,
        },
    ));
    accounting.initialize_supply().await?;
    accounting.record_restart().await?;

    // Stores: Redis / Postgres when configured, in-memory otherwise.
    let sessions: Arc<dyn SessionStore> = match &config.stores.session_store_url {
        Some(url) => {
            info!("connecting to session store");
            Arc::new(RedisSessionStore::new(url, config.session_ttl_seconds()).await?)
        }
        None => {
            info!("using in-memory session store");
            Arc::new(MemorySessionStore::new(config.session_ttl_seconds()))
        }
    };
    let limiter: Arc<dyn RateLimiter> = match &config.stores.session_store_url {
        Some(url) => Arc::new(RedisRateLimiter::new(url).await?),
        None => Arc::new(MemoryRateLimiter::new()),
    };
    let orders: Arc<dyn OrderStore> = match &config.stores.database_url {
        Some(url) => {
            info!("connecting to order store");
            let store = PostgresOrderStore::connect(url).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            info!("using in-memory order store");
            Arc::new(MemoryOrderStore::new())
        }
    };

    let mockpay = Arc::new(MockPay::new(
        config.webhook.secret.clone(),
        config.webhook.mock_webhook_url.clone(),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&accounting),
        sessions,
        orders,
        limiter,
        Arc::clone(&mockpay),
        OrchestratorConfig {
            hold_timeout_seconds: u32::try_from(config.checkout.hold_timeout_seconds)
                .unwrap_or(300),
            sweep_grace_seconds: u32::try_from(config.checkout.sweep_grace_seconds)
                .unwrap_or(30),
            rate_limit_requests: config.checkout.rate_limit_requests,
            rate_limit_window: Duration::from_secs(config.checkout.rate_limit_window_seconds),
        },
    ));

    tokio::spawn(Arc::clone(&orchestrator).run_sweeper(Duration::from_secs(
        config.checkout.sweep_interval_seconds,
    )));

    let state = AppState {
        orchestrator,
        accounting,
        mockpay,
        webhook_secret: config.webhook.secret.clone(),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}
