//! HTTP adapter: request materialization, response writers, network
//! identity, and the axum server lifecycle.

pub mod config;
pub mod debug;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod module;
pub mod request;
pub mod response;

pub use config::NetworkConfig;
pub use debug::DebugResponseWriter;
pub use handlers::AppState;
pub use identity::{init_local_addresses, local_addresses, origin_attributes, NetworkAddressSet};
pub use module::NetworkModule;
pub use request::{extract_request_context, RequestError};
pub use response::{ErrorBody, HttpResponseWriter};
