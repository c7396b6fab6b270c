//! Service-wide feature flags and request-scoped attribute flags.

use bitflags::bitflags;

bitflags! {
    /// Globally togglable capabilities. A service runs with either every
    /// feature enabled (`Feature::all()`) or a restricted subset.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Feature: u32 {
        const JSON = 1 << 0;
        const XML = 1 << 1;
        const CSV = 1 << 2;
        const HTML = 1 << 3;
        const MSGPACK = 1 << 4;
        const METADATA = 1 << 5;
        const PREDEFINED_ROUTES = 1 << 6;
        const REQUEST_INFO = 1 << 7;
        const CUSTOM_FORMAT = 1 << 8;
    }
}

impl Feature {
    /// Returns `true` unless every known feature is enabled.
    #[must_use]
    pub fn is_restricted(self) -> bool {
        self != Feature::all()
    }

    /// Maps a response format name (`json`, `msgpack`, ...) to the feature
    /// that gates it. Unrecognised formats are treated as custom formats.
    #[must_use]
    pub fn for_format(format: &str) -> Feature {
        match format.to_ascii_lowercase().as_str() {
            "json" => Feature::JSON,
            "xml" => Feature::XML,
            "csv" => Feature::CSV,
            "html" => Feature::HTML,
            "msgpack" | "x-msgpack" => Feature::MSGPACK,
            _ => Feature::CUSTOM_FORMAT,
        }
    }
}

impl Default for Feature {
    fn default() -> Self {
        Feature::all()
    }
}

bitflags! {
    /// Per-request flags describing where a request came from and how it
    /// arrived. Filled in by the transport adapter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RequestAttributes: u32 {
        const LOCALHOST = 1 << 0;
        const LOCAL_SUBNET = 1 << 1;
        const EXTERNAL = 1 << 2;
        const SECURE = 1 << 3;
        const HTTP_GET = 1 << 4;
        const HTTP_POST = 1 << 5;
        const HTTP_PUT = 1 << 6;
        const HTTP_DELETE = 1 << 7;
        const HTTP_PATCH = 1 << 8;
        const HTTP_OPTIONS = 1 << 9;
        const HTTP_HEAD = 1 << 10;
    }
}

impl RequestAttributes {
    /// Attribute flag for an HTTP verb, or empty for non-standard verbs.
    #[must_use]
    pub fn for_method(method: &http::Method) -> RequestAttributes {
        match *method {
            http::Method::GET => RequestAttributes::HTTP_GET,
            http::Method::POST => RequestAttributes::HTTP_POST,
            http::Method::PUT => RequestAttributes::HTTP_PUT,
            http::Method::DELETE => RequestAttributes::HTTP_DELETE,
            http::Method::PATCH => RequestAttributes::HTTP_PATCH,
            http::Method::OPTIONS => RequestAttributes::HTTP_OPTIONS,
            http::Method::HEAD => RequestAttributes::HTTP_HEAD,
            _ => RequestAttributes::empty(),
        }
    }

    /// Whether the request originated from this host or its local network.
    #[must_use]
    pub fn is_local(self) -> bool {
        self.intersects(RequestAttributes::LOCALHOST | RequestAttributes::LOCAL_SUBNET)
    }
}
