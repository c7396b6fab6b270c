//! Classified request-handling errors.
//!
//! Every failure the core reports is one of the [`ClassifiedError`]
//! variants. Underlying causes travel as `anyhow::Error` so callers can
//! still downcast to the exact error an operation raised.

use std::fmt;

use http::StatusCode;

/// Why an [`AccessGate`](ClassifiedError::AccessDenied) check refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// The feature gating this endpoint is disabled service-wide.
    FeatureNotAvailable,
    /// The format registry does not expose the operation to this request.
    ServiceNotAvailable,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::FeatureNotAvailable => "Feature Not Available",
            DenyReason::ServiceNotAvailable => "Service Not Available",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cause carried by a faulted computation.
#[derive(Debug)]
pub enum FaultCause {
    /// Exactly one underlying error.
    Single(anyhow::Error),
    /// Several errors raised together.
    Composite(Vec<anyhow::Error>),
}

impl FaultCause {
    /// Collapses a list of errors: one error stays itself, anything else
    /// becomes a composite.
    #[must_use]
    pub fn from_errors(mut errors: Vec<anyhow::Error>) -> Self {
        if errors.len() == 1 {
            FaultCause::Single(errors.remove(0))
        } else {
            FaultCause::Composite(errors)
        }
    }

    /// The single cause, if there is exactly one.
    #[must_use]
    pub fn single(&self) -> Option<&anyhow::Error> {
        match self {
            FaultCause::Single(err) => Some(err),
            FaultCause::Composite(_) => None,
        }
    }

    /// All underlying errors in the order they were raised.
    #[must_use]
    pub fn errors(&self) -> Vec<&anyhow::Error> {
        match self {
            FaultCause::Single(err) => vec![err],
            FaultCause::Composite(errs) => errs.iter().collect(),
        }
    }
}

impl fmt::Display for FaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultCause::Single(err) => write!(f, "{err}"),
            FaultCause::Composite(errs) => {
                write!(f, "{} errors occurred", errs.len())?;
                for (i, err) in errs.iter().enumerate() {
                    write!(f, "; [{i}] {err}")?;
                }
                Ok(())
            }
        }
    }
}

/// Tagged union of every failure the request-handling core can report.
#[derive(Debug, thiserror::Error)]
pub enum ClassifiedError {
    #[error("could not deserialize '{content_type}' request into {type_name}")]
    Serialization {
        content_type: String,
        type_name: &'static str,
        /// Set once the binder's caller knows which operation was requested.
        operation: Option<String>,
        #[source]
        source: anyhow::Error,
    },
    #[error("unknown operation: '{name}'")]
    UnknownOperation { name: String },
    #[error("access to '{operation}' denied: {reason}")]
    AccessDenied {
        operation: String,
        reason: DenyReason,
    },
    #[error("operation '{operation}' faulted: {cause}")]
    Faulted {
        operation: String,
        cause: FaultCause,
    },
    #[error("operation '{operation}' was canceled")]
    Canceled { operation: String },
    #[error("operation '{operation}' broke the completion contract: {detail}")]
    InvariantViolation { operation: String, detail: String },
}

impl ClassifiedError {
    /// Short variant name for logs and metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedError::Serialization { .. } => "serialization",
            ClassifiedError::UnknownOperation { .. } => "unknown_operation",
            ClassifiedError::AccessDenied { .. } => "access_denied",
            ClassifiedError::Faulted { .. } => "faulted",
            ClassifiedError::Canceled { .. } => "canceled",
            ClassifiedError::InvariantViolation { .. } => "invariant_violation",
        }
    }

    /// Status code the standard error-response path uses for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ClassifiedError::Serialization { .. } => StatusCode::BAD_REQUEST,
            ClassifiedError::UnknownOperation { .. } => StatusCode::NOT_FOUND,
            ClassifiedError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ClassifiedError::Canceled { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ClassifiedError::Faulted { .. } | ClassifiedError::InvariantViolation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Operation name the error is about, when one is known.
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        match self {
            ClassifiedError::Serialization { operation, .. } => operation.as_deref(),
            ClassifiedError::UnknownOperation { name } => Some(name),
            ClassifiedError::AccessDenied { operation, .. }
            | ClassifiedError::Faulted { operation, .. }
            | ClassifiedError::Canceled { operation }
            | ClassifiedError::InvariantViolation { operation, .. } => Some(operation),
        }
    }

    /// Tags a serialization error with the operation whose input failed to
    /// bind. Other variants already name their operation and pass through.
    #[must_use]
    pub fn with_operation(mut self, name: &str) -> Self {
        if let ClassifiedError::Serialization { operation, .. } = &mut self {
            *operation = Some(name.to_string());
        }
        self
    }
}
