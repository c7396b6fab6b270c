use std::net::IpAddr;

use bytes::Bytes;
use http::Method;

use crate::feature::RequestAttributes;

/// Per-request input bundle built by the transport and read by the core.
///
/// Everything a binder or gate needs to look at lives here: verb, content
/// headers, decoded query and form pairs, the raw body, and request-scoped
/// attribute flags. The core never mutates it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP verb.
    pub method: Method,
    /// Declared `Content-Type` header, verbatim.
    pub content_type: Option<String>,
    /// Declared `Content-Length`, if the transport supplied one.
    pub content_length: Option<u64>,
    /// Declared `Content-Encoding` (e.g. `gzip`).
    pub content_encoding: Option<String>,
    /// Decoded query-string pairs, in arrival order.
    pub query: Vec<(String, String)>,
    /// Decoded form fields (url-encoded or multipart text parts).
    pub form: Vec<(String, String)>,
    /// Raw request body.
    pub body: Bytes,
    /// Request-scoped flags (origin, security, verb).
    pub attributes: RequestAttributes,
    /// Resolved output format, e.g. `json`.
    pub response_format: String,
    /// Peer address of the connection, when known.
    pub remote_addr: Option<IpAddr>,
}

impl RequestContext {
    /// Creates an empty context for the given verb with a `json` response format.
    #[must_use]
    pub fn new(method: Method) -> Self {
        let attributes = RequestAttributes::for_method(&method);
        Self {
            method,
            content_type: None,
            content_length: None,
            content_encoding: None,
            query: Vec::new(),
            form: Vec::new(),
            body: Bytes::new(),
            attributes,
            response_format: "json".to_string(),
            remote_addr: None,
        }
    }

    #[must_use]
    pub fn with_query<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    #[must_use]
    pub fn with_form<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Sets the body together with its content type and length.
    #[must_use]
    pub fn with_body(mut self, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.content_type = Some(content_type.into());
        self.content_length = Some(body.len() as u64);
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    #[must_use]
    pub fn with_response_format(mut self, format: impl Into<String>) -> Self {
        self.response_format = format.into();
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: RequestAttributes) -> Self {
        self.attributes |= attributes;
        self
    }

    /// Lower-cased MIME type with parameters (`; charset=...`) stripped.
    #[must_use]
    pub fn mime_type(&self) -> Option<String> {
        self.content_type.as_deref().and_then(normalize_mime)
    }

    /// A body counts as present only when a content type is declared and
    /// the declared length is positive.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.content_type.is_some() && self.content_length.is_some_and(|len| len > 0)
    }

    /// Verbs that conventionally carry a request body.
    #[must_use]
    pub fn verb_carries_body(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH)
    }

    /// Returns the first query value for `key`.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Normalises a `Content-Type` header value to its bare MIME type.
#[must_use]
pub fn normalize_mime(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    if mime.is_empty() {
        None
    } else {
        Some(mime.to_ascii_lowercase())
    }
}
