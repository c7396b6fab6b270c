//! Wire encoding of resolved values and classified errors.
//!
//! `msgpack` requests get `rmp-serde` named-field encoding; every other
//! response format is answered with JSON.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use ferrule_core::{ClassifiedError, RequestContext};
use serde::Serialize;
use tracing::error;

use crate::service::codec::mime;
use crate::service::resolver::Resolved;
use crate::traits::ResponseWriter;

/// Standard [`ResponseWriter`] for the HTTP adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpResponseWriter;

/// Body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: &'static str,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl From<&ClassifiedError> for ErrorBody {
    fn from(error: &ClassifiedError) -> Self {
        let errors = match error {
            ClassifiedError::Faulted { cause, .. } => {
                cause.errors().iter().map(|e| format!("{e:#}")).collect()
            }
            ClassifiedError::Serialization { source, .. } => vec![format!("{source:#}")],
            _ => Vec::new(),
        };
        Self {
            error_code: error.kind(),
            status_code: error.status_code().as_u16(),
            message: error.to_string(),
            operation: error.operation().map(str::to_string),
            errors,
        }
    }
}

impl<T: Serialize> ResponseWriter<T> for HttpResponseWriter {
    type Output = Response;

    fn write_success(&self, ctx: &RequestContext, value: Resolved<T>) -> Response {
        encode(ctx, StatusCode::OK, &value)
    }

    fn write_error(&self, ctx: &RequestContext, error: ClassifiedError) -> Response {
        encode(ctx, error.status_code(), &ErrorBody::from(&error))
    }
}

/// Encodes `value` in the request's response format.
pub fn encode<V: Serialize + ?Sized>(ctx: &RequestContext, status: StatusCode, value: &V) -> Response {
    let encoded = if ctx.response_format.eq_ignore_ascii_case("msgpack") {
        rmp_serde::to_vec_named(value)
            .map(|bytes| (mime::MSGPACK, bytes))
            .map_err(anyhow::Error::from)
    } else {
        serde_json::to_vec(value)
            .map(|bytes| (mime::JSON, bytes))
            .map_err(anyhow::Error::from)
    };

    match encoded {
        Ok((content_type, bytes)) => {
            (status, [(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(err) => {
            error!(error = %err, format = %ctx.response_format, "failed to encode response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
                "response encoding failed",
            )
                .into_response()
        }
    }
}
