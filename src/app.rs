use crate::client::RestClient;
use crate::config::Config;
use crate::server::{HttpServer, SharedState};
use crate::telemetry::Metrics;
use crate::views::PreviewLinks;

use std::{error::Error, sync::Arc};
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let client = match RestClient::new(&config.classifier_api) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize classification client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let state = SharedState {
        client,
        links: PreviewLinks::from_config(&config.classifier_api)?,
        models: config.models.clone(),
        max_upload_bytes: config.server.max_upload_bytes,
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config.server.get_address()).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    if let Ok(Err(e)) = server_handle.await {
        tracing::error!("Server stopped with error: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
