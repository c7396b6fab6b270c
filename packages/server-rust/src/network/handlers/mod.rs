//! HTTP handler definitions for the operation endpoints.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports the handler functions used by the router.

pub mod operation;

pub use operation::{list_operations_handler, operation_handler, OperationSummary};

use std::sync::Arc;

use super::identity::NetworkAddressSet;
use super::NetworkConfig;
use crate::service::RequestPipeline;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
pub struct AppState<T> {
    /// Gate, binder, invoker, and resolver for every operation request.
    pub pipeline: Arc<RequestPipeline<T>>,
    /// Network configuration (bind address, body limit).
    pub config: Arc<NetworkConfig>,
    /// This host's addresses, used to classify request origins.
    pub local_addresses: &'static NetworkAddressSet,
}

impl<T> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            config: Arc::clone(&self.config),
            local_addresses: self.local_addresses,
        }
    }
}
