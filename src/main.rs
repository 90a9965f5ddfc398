use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use storefront::config::Config;
use storefront::db::{AppState, create_pool, init_audit_db, init_db};
use storefront::handlers;
use storefront::identity::SessionSigner;
use storefront::payments::MercadoPagoClient;
use storefront::reconcile;

#[derive(Parser, Debug)]
#[command(name = "storefront")]
#[command(about = "Payment-order reconciliation for a digital-goods storefront")]
struct Cli {
    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,

    /// Ask the processor about stale pending orders once, then exit
    #[arg(long)]
    reconcile_pending: bool,

    /// Minimum order age for --reconcile-pending
    #[arg(long, default_value_t = 30, requires = "reconcile_pending")]
    older_than_minutes: u64,
}

fn build_state(config: &Config) -> Result<AppState, String> {
    let db_timeout = Duration::from_secs(config.db_timeout_secs.max(1));

    let db_pool = create_pool(&config.database_path, db_timeout)
        .map_err(|e| format!("Failed to create database pool: {}", e))?;
    let audit_pool = create_pool(&config.audit_database_path, db_timeout)
        .map_err(|e| format!("Failed to create audit database pool: {}", e))?;

    {
        let conn = db_pool.get().map_err(|e| format!("Failed to get connection: {}", e))?;
        init_db(&conn).map_err(|e| format!("Failed to initialize database: {}", e))?;
    }
    {
        let conn = audit_pool
            .get()
            .map_err(|e| format!("Failed to get audit connection: {}", e))?;
        init_audit_db(&conn).map_err(|e| format!("Failed to initialize audit database: {}", e))?;
    }

    let gateway = MercadoPagoClient::new(&config.gateway)
        .map_err(|e| format!("Failed to create Mercado Pago client: {}", e))?;

    Ok(AppState {
        db: db_pool,
        audit: audit_pool,
        base_url: config.base_url.clone(),
        download_base_url: config.download_base_url.clone(),
        gateway: Arc::new(gateway),
        sessions: SessionSigner::new(&config.session_secret, config.session_ttl_hours),
    })
}

fn remove_database_files(path: &str) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!("Failed to remove {}: {}", path, e);
    } else {
        tracing::info!("Removed {}", path);
    }
    let _ = std::fs::remove_file(format!("{}-wal", path));
    let _ = std::fs::remove_file(format!("{}-shm", path));
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let state = build_state(&config).unwrap_or_else(|e| {
        eprintln!("Startup failed: {}", e);
        std::process::exit(1);
    });

    if cli.reconcile_pending {
        let older_than = Duration::from_secs(cli.older_than_minutes * 60);
        match reconcile::reconcile_stale_orders(&state, older_than).await {
            Ok(report) => {
                println!(
                    "Stale orders: examined={}, settled={}, still_pending={}, failed={}",
                    report.examined, report.settled, report.still_pending, report.failed
                );
                if report.failed > 0 {
                    std::process::exit(2);
                }
            }
            Err(e) => {
                eprintln!("Stale order pass failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let app = Router::new()
        .merge(handlers::public::router(&state, config.rate_limit))
        .merge(handlers::webhooks::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    if cli.ephemeral && !config.dev_mode {
        tracing::warn!("--ephemeral ignored: not in dev mode (set STOREFRONT_ENV=dev)");
    }
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Storefront listening on {}", addr);

    // Peer addresses feed the per-IP rate limiter.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        remove_database_files(&config.database_path);
        remove_database_files(&config.audit_database_path);
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
