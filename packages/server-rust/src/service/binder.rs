//! Materialises a typed operation input from raw request data.

use bytes::Buf;
use ferrule_core::{ClassifiedError, InputType, RequestContext, TypedInput};
use http::Method;
use tracing::debug;

use super::codec::{mime, DeserializerRegistry};

/// Where the binder took the input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSource {
    Query,
    Form,
    Body,
    Default,
}

/// Chooses a deserialization strategy from verb, body presence, and content type.
///
/// Decision order:
/// 1. no body and a `GET`/`DELETE`/`OPTIONS` verb: query-string pairs;
/// 2. url-encoded or multipart content type: form fields, for any verb;
/// 3. a body is present and a deserializer is registered for the content
///    type: that deserializer over the raw body;
/// 4. anything else: a default-valued instance.
///
/// A body counts as present when its declared length is positive, or when
/// a body-carrying verb declares a content encoding (compressed bodies often
/// arrive without a length).
#[derive(Clone)]
pub struct ContentTypeRequestBinder {
    deserializers: DeserializerRegistry,
}

impl ContentTypeRequestBinder {
    #[must_use]
    pub fn new(deserializers: DeserializerRegistry) -> Self {
        Self { deserializers }
    }

    #[must_use]
    pub fn deserializers(&self) -> &DeserializerRegistry {
        &self.deserializers
    }

    /// Picks the source `bind` will read from, without reading it.
    #[must_use]
    pub fn select_source(&self, ctx: &RequestContext) -> BindSource {
        let mime = ctx.mime_type();

        if !ctx.has_body() && is_bodiless_verb(&ctx.method) {
            return BindSource::Query;
        }
        if mime.as_deref().is_some_and(is_form_mime) {
            return BindSource::Form;
        }
        let body_present = ctx.content_length.is_some_and(|len| len > 0)
            || (ctx.verb_carries_body() && ctx.content_encoding.is_some());
        match mime {
            Some(mime) if body_present && self.deserializers.get(&mime).is_some() => {
                BindSource::Body
            }
            _ => BindSource::Default,
        }
    }

    /// Builds an instance of `target` from `ctx`.
    ///
    /// # Errors
    ///
    /// Returns `ClassifiedError::Serialization` when the chosen source cannot
    /// be converted into `target`. The original error is kept as the source.
    pub fn bind(
        &self,
        ctx: &RequestContext,
        target: &dyn InputType,
    ) -> Result<TypedInput, ClassifiedError> {
        let source = self.select_source(ctx);
        debug!(
            method = %ctx.method,
            content_type = ctx.content_type.as_deref().unwrap_or(""),
            target = target.type_name(),
            ?source,
            "binding request"
        );

        match source {
            BindSource::Query => target
                .parse(&ctx.query)
                .map_err(|err| serialization_error("query-string", target, err)),
            BindSource::Form => {
                let content_type = ctx.mime_type().unwrap_or_default();
                target
                    .parse(&ctx.form)
                    .map_err(|err| serialization_error(&content_type, target, err))
            }
            BindSource::Body => self.bind_body(ctx, target),
            BindSource::Default => Ok(target.create()),
        }
    }

    fn bind_body(
        &self,
        ctx: &RequestContext,
        target: &dyn InputType,
    ) -> Result<TypedInput, ClassifiedError> {
        let content_type = ctx.mime_type().unwrap_or_default();
        let Some(deserializer) = self.deserializers.get(&content_type) else {
            return Ok(target.create());
        };
        let mut reader = ctx.body.clone().reader();
        deserializer
            .deserialize(target, &mut reader)
            .map_err(|err| serialization_error(&content_type, target, err))
    }
}

fn is_bodiless_verb(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::DELETE | Method::OPTIONS)
}

fn is_form_mime(mime: &str) -> bool {
    mime == mime::FORM_URLENCODED || mime == mime::MULTIPART_FORM
}

fn serialization_error(
    content_type: &str,
    target: &dyn InputType,
    source: anyhow::Error,
) -> ClassifiedError {
    ClassifiedError::Serialization {
        content_type: content_type.to_string(),
        type_name: target.type_name(),
        operation: None,
        source,
    }
}
