use crate::{create_router, AppState};
use anyhow::Context;
use bikeforge_core::config_manager::ServerConfig;
use tokio::signal;
use tracing::{info, warn};

pub struct Server {
    state: AppState,
    host: String,
    port: u16,
}

impl Server {
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        Self {
            state,
            host: config.host.clone(),
            port: config.port,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let router = create_router(self.state);
        let listener = tokio::net::TcpListener::bind((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", self.host, self.port))?;
        let addr = listener.local_addr()?;

        info!("BikeForge API listening on http://{}", addr);
        info!("  POST /chat/complete - Advance a bike design conversation");
        info!("  GET  /chat/{{session_id}}/specification - Finalized specification");
        info!("  POST /image/generate - Render the finalized bike");
        info!("  GET  /image/download/{{session_id}} - Latest render as PNG");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
