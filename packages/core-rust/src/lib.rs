//! Ferrule core: request context, feature flags, typed operation inputs, and classified errors.

pub mod context;
pub mod error;
pub mod feature;
pub mod input;

pub use context::{normalize_mime, RequestContext};
pub use error::{ClassifiedError, DenyReason, FaultCause};
pub use feature::{Feature, RequestAttributes};
pub use input::{DtoType, InputType, OperationDescriptor, TypedInput};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
