use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use docent_core::{App, DocumentService, RagService};
use docent_store::SqliteStore;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::router::build_router;

#[derive(Clone)]
pub struct AppState {
    pub(crate) store: SqliteStore,
    pub(crate) documents: Arc<DocumentService>,
    pub(crate) rag: Arc<RagService>,
    pub(crate) started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(store: SqliteStore, documents: Arc<DocumentService>, rag: Arc<RagService>) -> Self {
        Self {
            store,
            documents,
            rag,
            started_at: Instant::now(),
        }
    }
}

impl From<&App> for AppState {
    fn from(app: &App) -> Self {
        Self::new(
            app.store.clone(),
            Arc::clone(&app.documents),
            Arc::clone(&app.rag),
        )
    }
}

pub struct GatewayServer {
    addr: SocketAddr,
    rate_limit: u32,
    max_body_size: usize,
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, state: AppState, shutdown_rx: watch::Receiver<bool>) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("server binding to 0.0.0.0, make sure it sits behind TLS termination");
        }

        Self {
            addr,
            rate_limit: 120,
            max_body_size: 64 * 1024 * 1024,
            state,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, limit: u32) -> Self {
        self.rate_limit = limit;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Serve until the shutdown channel flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let router = build_router(self.state, self.rate_limit, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow_and_update() {
                if shutdown_rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            tracing::info!("server shutting down");
        })
        .await
        .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
