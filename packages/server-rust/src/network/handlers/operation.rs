//! Operation dispatch and the debug operation listing.

use axum::extract::{Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use super::AppState;
use crate::network::debug::DebugResponseWriter;
use crate::network::request::extract_request_context;
use crate::network::response::HttpResponseWriter;
use crate::service::codec::mime;

/// Handles `/{format}/reply/{operation}` for every verb.
///
/// The request is materialized, run through the pipeline, and written by
/// the debug writer when the client asked for `?debug` in debug mode, or by
/// the negotiated writer otherwise.
pub async fn operation_handler<T>(
    State(state): State<AppState<T>>,
    Path((format, operation)): Path<(String, String)>,
    request: Request,
) -> Response
where
    T: Serialize + Send + Sync + 'static,
{
    let ctx = match extract_request_context(
        request,
        &format,
        state.local_addresses,
        state.config.max_body_bytes,
    )
    .await
    {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    if state.pipeline.debug_requested(&ctx) {
        state
            .pipeline
            .handle(&ctx, &operation, &DebugResponseWriter)
            .await
    } else {
        state
            .pipeline
            .handle(&ctx, &operation, &HttpResponseWriter)
            .await
    }
}

/// One row of the debug operation listing.
#[derive(Debug, Serialize)]
pub struct OperationSummary {
    pub name: String,
    pub input: &'static str,
}

/// `GET /debug/operations`: registered operations as plain text.
pub async fn list_operations_handler<T>(State(state): State<AppState<T>>) -> Response
where
    T: Send + Sync + 'static,
{
    let registry = state.pipeline.registry();
    let operations: Vec<OperationSummary> = registry
        .names()
        .into_iter()
        .filter_map(|name| registry.get(&name).ok())
        .map(|descriptor| OperationSummary {
            name: descriptor.name().to_string(),
            input: descriptor.input().type_name(),
        })
        .collect();

    DebugResponseWriter
        .write_debug(&operations)
        .unwrap_or_else(|err| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
                err.to_string(),
            )
                .into_response()
        })
}
