//! Network module with deferred startup lifecycle.
//!
//! `new()` wires the router state, `start()` binds the TCP listener, and
//! `serve()` starts accepting connections. Operations can still be
//! registered between `start()` and `serve()` since the registry is shared.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{any, get};
use axum::Router;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{list_operations_handler, operation_handler, AppState};
use super::identity::local_addresses;
use super::middleware::apply_http_layers;
use crate::service::RequestPipeline;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- takes the pipeline that answers every operation request
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule<T> {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    pipeline: Arc<RequestPipeline<T>>,
}

impl<T> NetworkModule<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, pipeline: Arc<RequestPipeline<T>>) -> Self {
        Self {
            config,
            listener: None,
            pipeline,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> Arc<RequestPipeline<T>> {
        Arc::clone(&self.pipeline)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `ANY /{format}/reply/{operation}` -- operation dispatch
    /// - `GET /debug/operations` -- registered operations, debug mode only
    pub fn build_router(&self) -> Router {
        let state = AppState {
            pipeline: Arc::clone(&self.pipeline),
            config: Arc::new(self.config.clone()),
            local_addresses: local_addresses(),
        };

        let mut router = Router::new().route(
            "/{format}/reply/{operation}",
            any(operation_handler::<T>),
        );
        if self.pipeline.debug_mode() {
            router = router.route("/debug/operations", get(list_operations_handler::<T>));
        }

        let router = router.layer(DefaultBodyLimit::max(self.config.max_body_bytes));
        apply_http_layers(router, &self.config).with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until `shutdown` resolves, then lets in-flight
    /// requests finish.
    ///
    /// Handlers see the peer address through `ConnectInfo<SocketAddr>`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server
    /// hits a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };

        info!(
            operations = self.pipeline.registry().len(),
            debug_mode = self.pipeline.debug_mode(),
            "Serving HTTP connections"
        );

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
