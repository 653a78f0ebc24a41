mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use issuehub_api::auth::ensure_admin;
use issuehub_api::provider::HttpPaymentProvider;
use issuehub_api::uploads::Uploads;
use issuehub_api::{AppState, AppStateInner, PaymentSettings};
use issuehub_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issuehub=debug,issuehub_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    match &config.admin {
        Some(admin) => {
            ensure_admin(&db, &admin.name, &admin.email, &admin.password)?;
        }
        None => warn!("ISSUEHUB_ADMIN_EMAIL/ISSUEHUB_ADMIN_PASSWORD not set; no admin bootstrap"),
    }

    if config.payment_secret_key.is_empty() {
        warn!("ISSUEHUB_PAYMENT_SECRET_KEY not set; payment endpoints will fail");
    }
    let payments = HttpPaymentProvider::new(
        config.payment_api_base.clone(),
        config.payment_secret_key.clone(),
        config.payment_timeout,
    )?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        token_ttl: config.token_ttl,
        uploads: Uploads::new(config.upload_dir.clone()).await?,
        payments: Arc::new(payments),
        payment_settings: PaymentSettings {
            boost_amount: config.boost_price,
            premium_amount: config.premium_price,
            currency: config.currency.clone(),
            provider_timeout: config.payment_timeout,
            client_url: config.client_url.clone(),
        },
    });

    let app = issuehub_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("IssueHub server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
