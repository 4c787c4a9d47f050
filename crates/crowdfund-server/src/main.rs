use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header::CONTENT_TYPE};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crowdfund_api::images::{ImageHost, ImageHostConfig};
use crowdfund_api::{AppStateInner, router};
use crowdfund_chain::{ChainConfig, ChainReader, Reconciler, Web3Gateway};
use crowdfund_service::{CampaignService, UserService};

/// Request body cap; covers multipart image uploads.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// After a shutdown signal the process exits with status 1 if draining
/// takes longer than this.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "crowdfund_server=debug,crowdfund_api=debug,crowdfund_service=debug,crowdfund_chain=info,tower_http=debug".into()
            }),
        )
        .init();

    // Config
    let host = std::env::var("CROWDFUND_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CROWDFUND_PORT")
        .unwrap_or_else(|_| "5000".into())
        .parse()?;
    let db_path: PathBuf = std::env::var("CROWDFUND_DB_PATH")
        .unwrap_or_else(|_| "crowdfund.db".into())
        .into();
    let environment = std::env::var("CROWDFUND_ENV").unwrap_or_else(|_| "development".into());
    let client_url = std::env::var("CROWDFUND_CLIENT_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let chain_config = ChainConfig {
        rpc_url: optional_env("CROWDFUND_RPC_URL"),
        contract_address: optional_env("CROWDFUND_CONTRACT_ADDRESS"),
    };
    let image_config = ImageHostConfig {
        upload_url: optional_env("CROWDFUND_IMAGE_UPLOAD_URL"),
        upload_preset: optional_env("CROWDFUND_IMAGE_UPLOAD_PRESET"),
    };

    // Store and services
    let db = Arc::new(crowdfund_db::Database::open(&db_path)?);
    let campaigns = CampaignService::new(db.clone());
    let users = UserService::new(db);

    // Chain
    let gateway = match Web3Gateway::new(&chain_config) {
        Ok(gateway) => Some(Arc::new(gateway)),
        Err(e) => {
            warn!("Chain sync disabled: {}", e);
            None
        }
    };
    let reconciler = Reconciler::spawn(gateway.clone(), campaigns.clone());

    let state = Arc::new(AppStateInner {
        campaigns,
        users,
        gateway: gateway.map(|g| g as Arc<dyn ChainReader>),
        images: ImageHost::new(image_config),
        reconciler: reconciler.subscribe_state(),
        production: environment == "production",
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_str(&client_url)?))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true);

    let app = router(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("CrowdFunding API listening on {} ({})", addr, environment);
    info!("CORS origin: {}", client_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));
    tokio::spawn(force_exit_after_grace(shutdown.clone()));
    // Stops chain events at the signal, not after connections drain.
    let reconciler_stopped = reconciler.shutdown_on(shutdown.clone());

    let draining = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { draining.cancelled().await })
        .await;

    shutdown.cancel();
    if let Err(e) = reconciler_stopped.await {
        error!("Reconciler shutdown task failed: {}", e);
    }
    served?;
    info!("Shutdown complete");
    Ok(())
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

async fn watch_signals(shutdown: CancellationToken) {
    shutdown_signal().await;
    shutdown.cancel();
}

async fn force_exit_after_grace(shutdown: CancellationToken) {
    shutdown.cancelled().await;
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    error!("Graceful shutdown did not finish within {:?}, exiting", SHUTDOWN_GRACE);
    std::process::exit(1);
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
