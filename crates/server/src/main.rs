// crates/server/src/main.rs
//! IoT control panel server binary.
//!
//! `iot-panel` serves the API and device sockets. `iot-panel create-admin`
//! seeds the first account and exits.

use anyhow::{Context, Result};
use clap::Parser;
use iot_panel_db::{Database, NewUser};
use iot_panel_server::auth::hash_password;
use iot_panel_server::{create_app, AppState, Cli, Command, Config};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "warn,iot_panel_server=info,iot_panel_relay=info,iot_panel_db=info";

async fn open_database(config: &Config) -> Result<Database> {
    let db = match &config.db_path {
        Some(path) => Database::new(path).await,
        None => Database::open_default().await,
    }
    .context("failed to open database")?;
    tracing::info!(path = %db.db_path().display(), "database ready");
    Ok(db)
}

async fn create_admin(
    db: &Database,
    username: String,
    password: String,
    email: String,
    name: String,
) -> Result<()> {
    if let Some(existing) = db.get_user_by_username(&username).await? {
        eprintln!("  User '{}' already exists (id {})", existing.username, existing.id);
        return Ok(());
    }

    let password_hash = hash_password(&password).context("failed to hash password")?;
    let user = db
        .insert_user(&NewUser {
            name,
            username,
            password_hash,
            email,
            status: true,
        })
        .await?;
    eprintln!("  Created user '{}' (id {})", user.username, user.id);
    Ok(())
}

async fn serve(db: Database, config: Config) -> Result<()> {
    let state = AppState::new(db, &config);
    let app = create_app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    eprintln!("\n  iot-panel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("  \u{2192} http://{addr}/api");
    eprintln!("  \u{2192} ws://{addr}/ws/device/{{id}}\n");
    tracing::info!(%addr, control_device = config.control_device, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .compact()
        .init();

    let config = Config::resolve(&cli);
    let db = open_database(&config).await?;

    match cli.command {
        Some(Command::CreateAdmin {
            username,
            password,
            email,
            name,
        }) => create_admin(&db, username, password, email, name).await,
        Some(Command::Serve) | None => serve(db, config).await,
    }
}
