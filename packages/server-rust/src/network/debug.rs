//! Plain-text diagnostic output.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use ferrule_core::{ClassifiedError, RequestContext};
use serde::Serialize;
use tracing::warn;

use super::response::HttpResponseWriter;
use crate::service::codec::mime;
use crate::service::resolver::Resolved;
use crate::traits::ResponseWriter;

/// Writes any serializable value as indented JSON text with a
/// `text/plain` content type, ignoring the negotiated response format.
///
/// Only reached when a client asks for `?debug` and the server runs in
/// debug mode, or through the debug listing endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugResponseWriter;

impl DebugResponseWriter {
    /// Formats `value` for humans.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error unchanged.
    pub fn write_debug<V: Serialize + ?Sized>(&self, value: &V) -> Result<Response, serde_json::Error> {
        let text = serde_json::to_string_pretty(value)?;
        Ok(([(header::CONTENT_TYPE, mime::TEXT_PLAIN)], text).into_response())
    }
}

impl<T: Serialize> ResponseWriter<T> for DebugResponseWriter {
    type Output = Response;

    fn write_success(&self, _ctx: &RequestContext, value: Resolved<T>) -> Response {
        self.write_debug(&value).unwrap_or_else(|err| {
            warn!(error = %err, "debug output failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, mime::TEXT_PLAIN)],
                format!("debug output failed: {err}"),
            )
                .into_response()
        })
    }

    // Errors keep the standard path so status codes stay intact.
    fn write_error(&self, ctx: &RequestContext, error: ClassifiedError) -> Response {
        ResponseWriter::<T>::write_error(&HttpResponseWriter, ctx, error)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::body::to_bytes;
    use http::Method;
    use serde::ser::Error as _;

    use super::*;

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn any_value_becomes_indented_text() {
        let mut value = BTreeMap::new();
        value.insert("name", "ferrule");

        let response = DebugResponseWriter.write_debug(&value).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], mime::TEXT_PLAIN);
        assert_eq!(body_text(response).await, "{\n  \"name\": \"ferrule\"\n}");
    }

    #[tokio::test]
    async fn negotiated_format_is_ignored() {
        let ctx = RequestContext::new(Method::GET).with_response_format("msgpack");
        let response = DebugResponseWriter.write_success(&ctx, Resolved::Sequence(vec![1, 2]));
        assert_eq!(response.headers()[header::CONTENT_TYPE], mime::TEXT_PLAIN);
        assert_eq!(body_text(response).await, "[\n  1,\n  2\n]");
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refused"))
        }
    }

    #[test]
    fn serializer_failure_propagates() {
        let err = DebugResponseWriter
            .write_debug(&Unserializable)
            .err()
            .expect("serialization should fail");
        assert!(err.to_string().contains("refused"));
    }

    #[tokio::test]
    async fn errors_use_the_standard_path() {
        let ctx = RequestContext::new(Method::GET);
        let error = ClassifiedError::UnknownOperation {
            name: "Nope".to_string(),
        };
        let response = ResponseWriter::<()>::write_error(&DebugResponseWriter, &ctx, error);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], mime::JSON);
    }
}
