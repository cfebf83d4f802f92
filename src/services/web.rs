use anyhow::Context;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, trace};

use crate::cli::ServiceName;
use crate::services::Service;
use crate::state::{AppState, ServiceStatus};
use crate::web::create_router;

/// HTTP API server.
pub struct WebService {
    port: u16,
    app_state: AppState,
}

impl WebService {
    pub fn new(port: u16, app_state: AppState) -> Self {
        Self { port, app_state }
    }
}

#[async_trait]
impl Service for WebService {
    fn name(&self) -> &'static str {
        ServiceName::Web.as_str()
    }

    async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind web server to {addr}"))?;

        let app = create_router(self.app_state.clone());
        self.app_state
            .service_statuses
            .set(self.name(), ServiceStatus::Active);
        info!(service = self.name(), address = %addr, "web server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                trace!("web server received shutdown signal");
            })
            .await
            .context("Web server failed")?;

        info!(service = self.name(), "web server stopped");
        Ok(())
    }
}
