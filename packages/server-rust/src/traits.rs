use ferrule_core::{ClassifiedError, OperationDescriptor, RequestContext, TypedInput};

use crate::service::computation::ComputationResult;
use crate::service::resolver::Resolved;

/// Per-operation, per-format visibility.
/// Queried by the access gate after the feature check passes.
pub trait FormatRegistry: Send + Sync {
    /// Whether a request resolved to `format` may invoke `operation`.
    fn can_access(&self, ctx: &RequestContext, format: &str, operation: &str) -> bool;
}

/// Dispatches a bound input to the operation implementation.
/// Implementations may return a value, a pending computation, or a batch.
pub trait OperationInvoker<T>: Send + Sync {
    fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        ctx: &RequestContext,
        input: TypedInput,
    ) -> ComputationResult<T>;
}

/// Serializes a resolved value or a classified error onto the wire.
/// Picks status codes and content types; the core only decides which
/// method to call.
pub trait ResponseWriter<T> {
    type Output;

    fn write_success(&self, ctx: &RequestContext, value: Resolved<T>) -> Self::Output;

    fn write_error(&self, ctx: &RequestContext, error: ClassifiedError) -> Self::Output;
}
