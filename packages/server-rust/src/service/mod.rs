//! Request-handling core.
//!
//! This module implements the path from raw request data to one response:
//!
//! 1. **Access gate** (`gate`): feature flag and per-operation format visibility
//! 2. **Registry** (`registry`): operation name -> input factory
//! 3. **Binding** (`binder`, `codec`): pick query, form, or body deserializer
//! 4. **Resolution** (`computation`, `resolver`): value, pending, or batch -> one result
//! 5. **Pipeline** (`pipeline`): strings the above together around an invoker

pub mod binder;
pub mod codec;
pub mod computation;
pub mod config;
pub mod gate;
pub mod pipeline;
pub mod registry;
pub mod resolver;

// Re-export key types for convenient access.
pub use binder::{BindSource, ContentTypeRequestBinder};
pub use codec::{DeserializerRegistry, JsonDeserializer, MsgPackDeserializer, StreamDeserializer};
pub use computation::{Completer, ComputationResult, Outcome, Pending, Produced};
pub use config::ServerConfig;
pub use gate::{AccessGate, VisibilityRules};
pub use pipeline::RequestPipeline;
pub use registry::OperationRegistry;
pub use resolver::{Resolved, ResultResolver};
