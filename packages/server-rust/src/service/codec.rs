//! Request-body deserializers keyed by MIME type.

use std::io::Read;
use std::sync::Arc;

use dashmap::DashMap;
use ferrule_core::{normalize_mime, InputType, TypedInput};

/// Materialises a typed input from a raw body stream.
pub trait StreamDeserializer: Send + Sync {
    /// Reads `body` to the end and builds an instance of `target`.
    ///
    /// # Errors
    ///
    /// Returns an error when the body is malformed or does not fit `target`.
    fn deserialize(&self, target: &dyn InputType, body: &mut dyn Read)
        -> anyhow::Result<TypedInput>;
}

/// `application/json` bodies via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDeserializer;

impl StreamDeserializer for JsonDeserializer {
    fn deserialize(
        &self,
        target: &dyn InputType,
        body: &mut dyn Read,
    ) -> anyhow::Result<TypedInput> {
        let value: serde_json::Value = serde_json::from_reader(body)?;
        target.from_value(value)
    }
}

/// MessagePack bodies via `rmp-serde`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackDeserializer;

impl StreamDeserializer for MsgPackDeserializer {
    fn deserialize(
        &self,
        target: &dyn InputType,
        body: &mut dyn Read,
    ) -> anyhow::Result<TypedInput> {
        let value: serde_json::Value = rmp_serde::from_read(body)?;
        target.from_value(value)
    }
}

pub mod mime {
    pub const JSON: &str = "application/json";
    pub const MSGPACK: &str = "application/msgpack";
    pub const X_MSGPACK: &str = "application/x-msgpack";
    pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
    pub const MULTIPART_FORM: &str = "multipart/form-data";
    pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
}

/// Lookup from MIME type to deserializer. Keys are normalised on both
/// insert and lookup, so `Application/JSON; charset=utf-8` finds the JSON entry.
#[derive(Clone, Default)]
pub struct DeserializerRegistry {
    by_mime: Arc<DashMap<String, Arc<dyn StreamDeserializer>>>,
}

impl DeserializerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with JSON and MessagePack deserializers.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(mime::JSON, JsonDeserializer);
        registry.register(mime::MSGPACK, MsgPackDeserializer);
        registry.register(mime::X_MSGPACK, MsgPackDeserializer);
        registry
    }

    /// Registers `deserializer` for `content_type`, replacing any previous entry.
    pub fn register<D: StreamDeserializer + 'static>(&self, content_type: &str, deserializer: D) {
        if let Some(key) = normalize_mime(content_type) {
            self.by_mime.insert(key, Arc::new(deserializer));
        }
    }

    /// Deserializer for a declared content type, if one is registered.
    #[must_use]
    pub fn get(&self, content_type: &str) -> Option<Arc<dyn StreamDeserializer>> {
        let key = normalize_mime(content_type)?;
        self.by_mime.get(&key).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_mime.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_mime.is_empty()
    }
}
