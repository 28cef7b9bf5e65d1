use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use teams_provision_broker::{AppContext, BrokerConfig, router};
use tokio::{signal, time::interval};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        tracing::error!("broker shut down with error: {error:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    init_tracing();

    let config = BrokerConfig::from_env().context("loading configuration")?;
    tracing::info!(?config, "configuration loaded");
    let context = Arc::new(AppContext::from_config(&config).context("building services")?);

    let shutdown = CancellationToken::new();
    let sweeper = {
        let sessions = context.sessions.clone();
        let service = context.service.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = sessions.purge_expired();
                        if removed > 0 {
                            tracing::debug!(target = "teams.auth", removed, "expired sessions purged");
                        }
                        let abandoned = service.purge_expired_auth_states();
                        if abandoned > 0 {
                            tracing::debug!(target = "teams.auth", abandoned, "expired auth states purged");
                        }
                    }
                }
            }
        })
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "http server listening");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, router(context))
        .with_graceful_shutdown(async move {
            let _ = signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper.await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
