//! Todo Backend - REST API for todo items and user accounts
//! Mission: Serve the todo list behind confirmed, role-checked accounts

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use todo_backend::{
    app::{build_router, AppState},
    config::Config,
    db::Database,
    media::{CloudinaryStore, DisabledImageStore, ImageStore},
    middleware::spawn_pruner,
    notify::{EmailSender, HttpMailer, LogMailer},
};

#[derive(Parser, Debug)]
#[command(name = "todo-server", about = "Todo backend HTTP server")]
struct Args {
    /// Address to listen on (overrides BIND_ADDR)
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// SQLite database file (overrides DATABASE_PATH)
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let args = Args::parse();

    info!("🚀 Todo backend starting");

    let mut config = Config::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(path) = args.database_path {
        config.database_path = path;
    }

    let db = Database::open(&config.database_path)?;
    info!("📊 Database initialized at: {}", config.database_path);

    let mailer = build_mailer(&config)?;
    let images = build_image_store(&config)?;

    let state = AppState::new(&config, db, mailer, images);

    if let Some((username, password)) = &config.bootstrap_admin {
        state
            .auth
            .users
            .ensure_admin(username, password)
            .await
            .context("Failed to create bootstrap admin")?;
    }

    spawn_pruner(state.rate_limiter.clone());
    info!(
        "🛡️  Rate limit: {} requests per {}s on credential endpoints",
        config.rate_limit_max_requests,
        config.rate_limit_window.as_secs()
    );

    let app = build_router(state, &config.cors_origins);

    // Start server
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("🎯 API server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn build_mailer(config: &Config) -> Result<Arc<dyn EmailSender>> {
    match &config.mail.api_url {
        Some(url) => {
            let mailer = HttpMailer::new(
                url.clone(),
                config.mail.api_key.as_deref(),
                config.mail.from.clone(),
            )?;
            info!("📧 Mail relay configured: {}", url);
            Ok(Arc::new(mailer))
        }
        None => {
            warn!("MAIL_API_URL not set, outgoing email will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

fn build_image_store(config: &Config) -> Result<Arc<dyn ImageStore>> {
    match &config.cloudinary {
        Some(cloudinary) => {
            info!("🖼️  Cloudinary uploads enabled ({})", cloudinary.cloud_name);
            Ok(Arc::new(CloudinaryStore::new(cloudinary.clone())?))
        }
        None => {
            warn!("Cloudinary credentials not set, image uploads are disabled");
            Ok(Arc::new(DisabledImageStore))
        }
    }
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_backend=debug,todo_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // 1) Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // 2) Also try the crate directory when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
