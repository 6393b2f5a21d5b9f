//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (access log, panic recovery, timeout)
//! - Serve on a listener until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::config::ConfigStore;
use crate::http::handlers;
use crate::http::middleware::{recovery_guard, request_observer};

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    store: Arc<ConfigStore>,
}

impl HttpServer {
    /// Create a new HTTP server reading configuration from `store`.
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self::with_routes(store, Router::new())
    }

    /// Like [`new`](Self::new), with `routes` served next to the built-in
    /// ones and behind the same middleware.
    pub fn with_routes(store: Arc<ConfigStore>, routes: Router<Arc<ConfigStore>>) -> Self {
        let router = Self::build_router(Arc::clone(&store), routes);
        Self { router, store }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// The request timeout is read once here; a reload does not change it
    /// for an already built router.
    #[allow(deprecated)]
    fn build_router(store: Arc<ConfigStore>, routes: Router<Arc<ConfigStore>>) -> Router {
        let timeout = Duration::from_secs(store.peek().request_timeout_secs);

        Router::new()
            .route("/", get(handlers::index))
            .route("/version", get(handlers::version))
            .merge(routes)
            .with_state(Arc::clone(&store))
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn(request_observer))
                    .layer(from_fn_with_state(store, recovery_guard))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// Router with the full middleware stack, for driving requests directly.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            name = %self.store.peek().name,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
