//! Gateway process entrypoint: loads settings, wires up every
//! collaborator the pipeline needs, and serves the HTTP surface.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use lr_clients::{ClientDirectory, FileDirectory, RemoteDirectory};
use lr_config::Settings;
use lr_providers::ProviderRegistry;
use lr_ratelimit::RateLimiter;
use lr_server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    lr_audit::init_tracing(&settings.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "starting LLM security gateway");

    let audit = Arc::new(
        lr_audit::AuditLogger::new(&settings.audit_log_file)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "could not open audit log file, falling back to stdout-only");
                lr_audit::AuditLogger::stdout_only()
            }),
    );

    let directory: Arc<dyn ClientDirectory> = build_directory(&settings).await?;
    let rate_limiter = Arc::new(RateLimiter::new());
    let providers = Arc::new(ProviderRegistry::new());
    let settings = Arc::new(settings);

    let state = AppState::new(settings.clone(), directory, rate_limiter.clone(), providers.clone(), audit);

    spawn_rate_limiter_sweep(rate_limiter);

    let app = lr_server::build_router(state);

    let addr: SocketAddr = std::env::var("GATEWAY_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");

    let shutdown_providers = providers.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_providers.close().await;
    info!("gateway shut down");

    Ok(())
}

/// Build the client directory backend named by `CLIENT_STORE_BACKEND`.
async fn build_directory(settings: &Settings) -> anyhow::Result<Arc<dyn ClientDirectory>> {
    match settings.client_store_backend.as_str() {
        "dynamodb" => {
            let sdk_config = {
                let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
                if !settings.aws_region.is_empty() {
                    loader = loader.region(aws_config::Region::new(settings.aws_region.clone()));
                }
                loader.load().await
            };
            let client = aws_sdk_dynamodb::Client::new(&sdk_config);
            Ok(Arc::new(RemoteDirectory::new(client, settings.dynamodb_table_name.clone())))
        }
        _ => {
            let directory = FileDirectory::load(&settings.client_config_path).map_err(|e| {
                anyhow::anyhow!("failed to load client directory at {}: {e}", settings.client_config_path)
            })?;
            Ok(Arc::new(directory))
        }
    }
}

/// Periodically drop idle, fully-expired rate-limit windows. Windows
/// are never explicitly torn down on the request path, so a long-lived
/// process with a large, churning client population wants this sweep.
/// Ten-minute cadence matches the gateway's other background-cleanup
/// interval.
fn spawn_rate_limiter_sweep(rate_limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(600));
        loop {
            interval.tick().await;
            rate_limiter.sweep();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler");
    }
    info!("shutdown signal received");
}
