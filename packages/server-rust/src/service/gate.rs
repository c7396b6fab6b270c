//! Two-stage authorization in front of every operation.

use std::collections::HashMap;
use std::sync::Arc;

use ferrule_core::{ClassifiedError, DenyReason, Feature, RequestContext};
use tracing::warn;

use crate::traits::{FormatRegistry, ResponseWriter};

/// Checks the service-wide feature set, then per-operation format visibility.
#[derive(Clone)]
pub struct AccessGate {
    enabled: Feature,
    formats: Arc<dyn FormatRegistry>,
}

impl AccessGate {
    #[must_use]
    pub fn new(enabled: Feature, formats: Arc<dyn FormatRegistry>) -> Self {
        Self { enabled, formats }
    }

    #[must_use]
    pub fn enabled_features(&self) -> Feature {
        self.enabled
    }

    /// Runs both checks, short-circuiting on the first denial.
    ///
    /// # Errors
    ///
    /// - `UnknownOperation` for an empty operation name (checked before anything else);
    /// - `AccessDenied` with `FeatureNotAvailable` when the feature set is
    ///   restricted and `required` is not in it;
    /// - `AccessDenied` with `ServiceNotAvailable` when the format registry
    ///   hides `operation` from this request's format.
    pub fn check(
        &self,
        ctx: &RequestContext,
        required: Feature,
        operation: &str,
    ) -> Result<(), ClassifiedError> {
        if operation.is_empty() {
            return Err(ClassifiedError::UnknownOperation {
                name: String::new(),
            });
        }

        let reason = if self.enabled.is_restricted() && !self.enabled.contains(required) {
            Some(DenyReason::FeatureNotAvailable)
        } else if !self
            .formats
            .can_access(ctx, &ctx.response_format, operation)
        {
            Some(DenyReason::ServiceNotAvailable)
        } else {
            None
        };

        match reason {
            None => Ok(()),
            Some(reason) => {
                warn!(operation, format = %ctx.response_format, %reason, "access denied");
                metrics::counter!("ferrule_access_denied_total", "reason" => reason.as_str())
                    .increment(1);
                Err(ClassifiedError::AccessDenied {
                    operation: operation.to_string(),
                    reason,
                })
            }
        }
    }

    /// Runs [`check`](Self::check); on failure the error is written through
    /// `writer` (a 403 for denials) and the written output is returned.
    ///
    /// # Errors
    ///
    /// Returns the writer's output for the failed check.
    pub fn authorize<T, W: ResponseWriter<T>>(
        &self,
        ctx: &RequestContext,
        required: Feature,
        operation: &str,
        writer: &W,
    ) -> Result<(), W::Output> {
        self.check(ctx, required, operation)
            .map_err(|err| writer.write_error(ctx, err))
    }
}

// ---------------------------------------------------------------------------
// VisibilityRules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Restriction {
    formats: Option<Vec<String>>,
    local_only: bool,
}

/// Default [`FormatRegistry`]: every operation is visible in every format
/// unless restricted here.
#[derive(Debug, Clone, Default)]
pub struct VisibilityRules {
    restrictions: HashMap<String, Restriction>,
}

impl VisibilityRules {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits `operation` to the listed response formats.
    #[must_use]
    pub fn formats(mut self, operation: &str, formats: &[&str]) -> Self {
        self.restrictions
            .entry(operation.to_string())
            .or_default()
            .formats = Some(formats.iter().map(|f| f.to_ascii_lowercase()).collect());
        self
    }

    /// Limits `operation` to requests from this host or its local network.
    #[must_use]
    pub fn local_only(mut self, operation: &str) -> Self {
        self.restrictions
            .entry(operation.to_string())
            .or_default()
            .local_only = true;
        self
    }
}

impl FormatRegistry for VisibilityRules {
    fn can_access(&self, ctx: &RequestContext, format: &str, operation: &str) -> bool {
        let Some(rule) = self.restrictions.get(operation) else {
            return true;
        };
        if rule.local_only && !ctx.attributes.is_local() {
            return false;
        }
        rule.formats
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|f| f.eq_ignore_ascii_case(format)))
    }
}
