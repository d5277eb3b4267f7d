//! sattrain-gateway binary.
//!
//! Usage:
//!   sattrain-gateway --port 8080
//!   sattrain-gateway --config sattrain.json --journal-dir ./journal
//!   RUST_LOG=sattrain_sim=debug sattrain-gateway --seed 7

use clap::Parser;
use sattrain_gateway::{AppState, GatewayConfig, router};
use sattrain_sim::{BroadcastRooms, JournalStore, MemoryStore, SessionManager, SessionStore, metrics};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = GatewayConfig::parse();
    let sim_config = config.resolve()?;

    info!("Initializing sattrain gateway");
    metrics::init();

    let journal = match &config.journal_dir {
        Some(dir) => {
            let journal = Arc::new(JournalStore::open(dir, config.journal_capacity)?);
            info!(dir = %dir.display(), "Journal enabled.");
            Some(journal)
        }
        None => None,
    };
    let store: Arc<dyn SessionStore> = match &journal {
        Some(journal) => journal.clone(),
        None => Arc::new(MemoryStore::new()),
    };

    let rooms = Arc::new(BroadcastRooms::new(sim_config.room_capacity));
    let manager = SessionManager::new(sim_config, store, rooms.clone());
    let state = AppState {
        manager: manager.clone(),
        rooms,
    };

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;

    info!(%addr, "Gateway listening.");
    info!("Endpoints:");
    info!("  GET    /scenarios               - Scenario catalog");
    info!("  GET    /anomalies               - Anomaly catalog");
    info!("  POST   /sessions                - Create session");
    info!("  GET    /sessions/{{id}}           - Session snapshot");
    info!("  DELETE /sessions/{{id}}           - Abandon session");
    info!("  POST   /sessions/{{id}}/commands  - Operator command");
    info!("  GET    /sessions/{{id}}/ws        - Event stream");
    info!("  GET    /metrics                 - Prometheus metrics");
    info!("  GET    /health                  - Health check");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install CTRL+C handler");
                std::future::pending::<()>().await;
            }
            info!("Shutting down... (stopping sessions)");
        })
        .await?;

    manager.stop_all().await;
    info!("All sessions stopped and persisted.");

    if let Some(journal) = journal {
        journal.close();
        info!("Journal flushed.");
    }
    info!("Goodbye.");
    Ok(())
}
