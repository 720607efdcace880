use crate::{
    client::ClassifierApi, config::ModelsConfig, routes::api_routes, telemetry::Metrics,
    views::PreviewLinks,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub client: Arc<dyn ClassifierApi>,
    pub links: PreviewLinks,
    pub models: ModelsConfig,
    pub max_upload_bytes: usize,
    pub metrics: Arc<Metrics>,
}

pub fn build_router(state: SharedState) -> Router {
    let metrics_layer = HttpMetricsLayerBuilder::new().build();
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes);

    Router::new()
        .merge(api_routes())
        .layer(body_limit)
        .with_state(state)
        .layer(metrics_layer)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, addr: &str) -> anyhow::Result<Self> {
        let router = build_router(state);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
