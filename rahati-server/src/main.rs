//! rahati server entry point

use clap::{Parser, Subcommand};
use rahati_core::model::{self, Role};
use rahati_core::RahatiError;
use rahati_store::repo::{centers, users};
use rahati_store::{seed, AuditLog, SqliteStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rahati_server::{auth::TokenService, build_router, config::ServerConfig, AppState};

#[derive(Parser)]
#[command(name = "rahati-server", version, about = "Healthcare facility booking server")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Insert or refresh the demo data set
    Seed,
    /// Attach an admin account to a center
    AssignAdminCenter {
        #[arg(long)]
        email: String,
        /// Defaults to the first center
        #[arg(long)]
        center_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = ServerConfig::load(std::path::Path::new(&cli.config).exists().then_some(cli.config.as_str()))
        .unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {e}");
            ServerConfig::default()
        });

    init_tracing(&config);

    if let Err(e) = std::fs::create_dir_all(&config.storage.data_dir) {
        tracing::error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let store = SqliteStore::open(config.database_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open booking store: {}", e);
        std::process::exit(1);
    });

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, store).await,
        Command::Seed => {
            if let Err(e) = run_seed(&store) {
                tracing::error!("Seeding failed: {}", e);
                std::process::exit(1);
            }
        }
        Command::AssignAdminCenter { email, center_id } => {
            if let Err(e) = assign_admin_center(&store, &email, center_id) {
                tracing::error!("Failed to assign center: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.level));
    let json = config.log.json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn run_seed(store: &SqliteStore) -> rahati_store::Result<()> {
    let report = store.in_transaction(|conn| seed::seed_demo_data(conn, model::now()))?;
    tracing::info!(
        centers = report.centers,
        users = report.users,
        rooms = report.rooms,
        meal_options = report.meal_options,
        capacities = report.capacities,
        "Demo data seeded"
    );
    Ok(())
}

fn assign_admin_center(store: &SqliteStore, email: &str, center_id: Option<i64>) -> rahati_core::Result<()> {
    let (user_id, center_id) = store.in_transaction(|conn| -> rahati_core::Result<_> {
        let mut user = users::find_by_email(conn, email)?
            .ok_or_else(|| RahatiError::rejected(format!("No user with email {email}")))?;
        if user.role != Role::Admin {
            return Err(RahatiError::rejected(format!("{email} is not an Admin account")));
        }

        let center = match center_id {
            Some(id) => centers::get(conn, id)?.ok_or_else(|| RahatiError::not_found("Center", id))?,
            None => centers::first(conn)?.ok_or_else(|| RahatiError::rejected("No centers exist yet"))?,
        };

        user.center_id = Some(center.id);
        user.updated_at = model::now();
        users::update(conn, &user)?;
        Ok((user.id, center.id))
    })?;

    tracing::info!(user_id, center_id, "Admin assigned to center");
    Ok(())
}

async fn serve(config: ServerConfig, store: SqliteStore) {
    tracing::info!("Starting rahati server...");

    if config.seed.on_startup
        && let Err(e) = run_seed(&store)
    {
        tracing::warn!("Failed to seed demo data: {}", e);
    }

    let audit_log = AuditLog::open(config.audit_db_path()).unwrap_or_else(|e| {
        tracing::error!("Failed to open audit log: {}", e);
        std::process::exit(1);
    });

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(
        "Auth: bearer tokens{}",
        if config.auth.allow_basic { " + basic" } else { "" }
    );

    let state = Arc::new(AppState {
        store,
        audit: Arc::new(Mutex::new(audit_log)),
        tokens: TokenService::from_settings(&config.auth),
        config,
    });

    let app = build_router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Server error: {}", e);
        });

    tracing::info!("Server shut down gracefully");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
