//! Ferrule server: request binding, access gating, and deferred-result
//! resolution for typed operations, served over axum.

pub mod network;
pub mod service;
pub mod traits;

pub use network::{DebugResponseWriter, HttpResponseWriter, NetworkConfig, NetworkModule};
pub use service::{RequestPipeline, ServerConfig};
pub use traits::{FormatRegistry, OperationInvoker, ResponseWriter};
