//! steeltrack-server - piece-mark lifecycle and field-reconciliation service
//!
//! Tracks fabricated steel components from shop fabrication through field
//! installation: status/location state machine, delivery reconciliation,
//! role-scoped authorization and an append-only activity log.

use anyhow::Result;
use clap::Parser;
use steeltrack_common::db::{init_database, setting_i64};
use steeltrack_common::events::EventBus;
use steeltrack_common::config;
use steeltrack_server::{build_router, AppState};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "steeltrack-server", about = "Piece-mark lifecycle service")]
struct Args {
    /// Root folder holding the database (overrides env and config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Port to listen on
    #[arg(long, env = "STEELTRACK_PORT", default_value_t = 5730)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init, before any
    // database delays
    info!(
        "Starting SteelTrack server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref());
    config::ensure_root_folder(&root_folder)?;

    let db_path = config::database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path).await?;

    let bus_capacity = setting_i64(&pool, "event_bus_capacity", 1000).await? as usize;
    let events = EventBus::new(bus_capacity);

    let state = AppState::new(pool, events);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("steeltrack-server listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
