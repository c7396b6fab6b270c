//! Builds a [`RequestContext`] from an axum request.

use std::net::SocketAddr;

use axum::body::to_bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{ConnectInfo, FromRequest, Multipart, Request};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use ferrule_core::{normalize_mime, RequestAttributes, RequestContext};
use tracing::debug;

use super::identity::{origin_attributes, NetworkAddressSet};
use crate::service::codec::mime;

/// Failures while reading the request off the wire, before the core sees it.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("could not read request body: {0}")]
    Body(#[source] axum::Error),
    #[error(transparent)]
    MultipartRejected(#[from] MultipartRejection),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        match self {
            RequestError::MultipartRejected(rejection) => rejection.into_response(),
            RequestError::Multipart(err) => err.into_response(),
            RequestError::Body(_) => (
                StatusCode::BAD_REQUEST,
                [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
                self.to_string(),
            )
                .into_response(),
        }
    }
}

/// Reads headers, query, form fields, and body into a [`RequestContext`].
///
/// Multipart requests contribute their text fields to `form`; file parts
/// are skipped and `body` stays empty. Url-encoded bodies are decoded into
/// `form` and kept in `body` too. The peer address comes from axum's
/// `ConnectInfo` extension when the server installed one.
///
/// # Errors
///
/// Returns [`RequestError`] when the body cannot be read within
/// `body_limit` bytes or a multipart stream is malformed.
pub async fn extract_request_context(
    request: Request,
    response_format: &str,
    local: &NetworkAddressSet,
    body_limit: usize,
) -> Result<RequestContext, RequestError> {
    let headers = request.headers();
    let content_type = header_str(headers, &header::CONTENT_TYPE);
    let declared_length = header_str(headers, &header::CONTENT_LENGTH).and_then(|v| v.parse().ok());
    let content_encoding = header_str(headers, &header::CONTENT_ENCODING);

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let mut attributes = origin_attributes(peer, local);
    if is_secure(&request) {
        attributes |= RequestAttributes::SECURE;
    }

    let mut ctx = RequestContext::new(request.method().clone())
        .with_response_format(response_format.to_ascii_lowercase())
        .with_attributes(attributes);
    ctx.query = request.uri().query().map(parse_pairs).unwrap_or_default();
    ctx.content_encoding = content_encoding;
    ctx.remote_addr = peer;

    let mime = content_type.as_deref().and_then(normalize_mime);
    ctx.content_type = content_type;

    if mime.as_deref() == Some(mime::MULTIPART_FORM) {
        ctx.form = read_multipart(request).await?;
        ctx.content_length = declared_length;
        return Ok(ctx);
    }

    let body = to_bytes(request.into_body(), body_limit)
        .await
        .map_err(RequestError::Body)?;
    if mime.as_deref() == Some(mime::FORM_URLENCODED) {
        ctx.form = parse_pairs_bytes(&body);
    }
    ctx.content_length = declared_length.or_else(|| {
        if body.is_empty() {
            None
        } else {
            u64::try_from(body.len()).ok()
        }
    });
    ctx.body = body;
    Ok(ctx)
}

async fn read_multipart(request: Request) -> Result<Vec<(String, String)>, RequestError> {
    let mut multipart = Multipart::from_request(request, &()).await?;
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if field.file_name().is_some() {
            debug!(field = %name, "skipping multipart file part");
            continue;
        }
        fields.push((name, field.text().await?));
    }
    Ok(fields)
}

fn header_str(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn is_secure(request: &Request) -> bool {
    request.uri().scheme_str() == Some("https")
        || request
            .headers()
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
}

fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    serde_urlencoded::from_str(raw).unwrap_or_else(|err| {
        debug!(error = %err, "ignoring undecodable query string");
        Vec::new()
    })
}

fn parse_pairs_bytes(raw: &[u8]) -> Vec<(String, String)> {
    serde_urlencoded::from_bytes(raw).unwrap_or_else(|err| {
        debug!(error = %err, "ignoring undecodable form body");
        Vec::new()
    })
}
