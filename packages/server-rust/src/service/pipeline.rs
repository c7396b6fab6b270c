//! Request pipeline: gate -> lookup -> bind -> invoke -> resolve -> write.

use std::sync::Arc;
use std::time::Instant;

use ferrule_core::{ClassifiedError, Feature, RequestContext};
use tracing::{info_span, Instrument};

use super::binder::ContentTypeRequestBinder;
use super::codec::DeserializerRegistry;
use super::config::ServerConfig;
use super::gate::AccessGate;
use super::registry::OperationRegistry;
use super::resolver::{Resolved, ResultResolver};
use crate::traits::{FormatRegistry, OperationInvoker, ResponseWriter};

/// Runs one request through the core.
///
/// Gate and binder failures short-circuit before the invoker is called;
/// resolver failures replace the success write. Every request ends in
/// exactly one writer call.
pub struct RequestPipeline<T> {
    registry: Arc<OperationRegistry>,
    gate: AccessGate,
    binder: ContentTypeRequestBinder,
    invoker: Arc<dyn OperationInvoker<T>>,
    debug_mode: bool,
}

impl<T: Send + 'static> RequestPipeline<T> {
    #[must_use]
    pub fn new(
        config: &ServerConfig,
        registry: Arc<OperationRegistry>,
        formats: Arc<dyn FormatRegistry>,
        deserializers: DeserializerRegistry,
        invoker: Arc<dyn OperationInvoker<T>>,
    ) -> Self {
        Self {
            registry,
            gate: AccessGate::new(config.enabled_features, formats),
            binder: ContentTypeRequestBinder::new(deserializers),
            invoker,
            debug_mode: config.debug_mode,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    #[must_use]
    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Whether the success value should go through the debug writer: the
    /// request carries a `debug` query key and debug mode is on.
    #[must_use]
    pub fn debug_requested(&self, ctx: &RequestContext) -> bool {
        self.debug_mode && ctx.query_value("debug").is_some()
    }

    /// Handles a request and writes the single response through `writer`.
    ///
    /// Gate denials are written by [`AccessGate::authorize`]; everything
    /// after the gate is written here.
    pub async fn handle<W: ResponseWriter<T>>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        writer: &W,
    ) -> W::Output {
        let required = Feature::for_format(&ctx.response_format);
        if let Err(denied) = self.gate.authorize::<T, W>(ctx, required, operation, writer) {
            return denied;
        }
        match self.dispatch(ctx, operation).await {
            Ok(value) => writer.write_success(ctx, value),
            Err(err) => writer.write_error(ctx, err),
        }
    }

    /// Runs the request without writing a response.
    ///
    /// # Errors
    ///
    /// Any [`ClassifiedError`] raised by the gate, the registry lookup, the
    /// binder, or the resolver.
    pub async fn execute(
        &self,
        ctx: &RequestContext,
        operation: &str,
    ) -> Result<Resolved<T>, ClassifiedError> {
        let required = Feature::for_format(&ctx.response_format);
        self.gate.check(ctx, required, operation)?;
        self.dispatch(ctx, operation).await
    }

    /// Lookup, bind, invoke, and resolve for a request that passed the gate.
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        operation: &str,
    ) -> Result<Resolved<T>, ClassifiedError> {
        let span = info_span!(
            "operation",
            operation,
            format = %ctx.response_format,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        async move {
            let start = Instant::now();
            let result = self.run(ctx, operation).await;

            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = start.elapsed().as_millis() as u64;
            let outcome = match &result {
                Ok(_) => "ok",
                Err(err) => err.kind(),
            };
            tracing::Span::current().record("duration_ms", duration_ms);
            tracing::Span::current().record("outcome", outcome);
            tracing::info!(operation, duration_ms, outcome, "operation complete");

            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        operation: &str,
    ) -> Result<Resolved<T>, ClassifiedError> {
        let descriptor = self.registry.get(operation)?;
        let input = self
            .binder
            .bind(ctx, descriptor.input())
            .map_err(|err| err.with_operation(descriptor.name()))?;

        let result = self.invoker.invoke(&descriptor, ctx, input);
        ResultResolver::new(descriptor.name()).resolve(result).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ferrule_core::{DenyReason, OperationDescriptor, TypedInput};
    use http::{Method, StatusCode};
    use serde::Deserialize;

    use super::*;
    use crate::service::computation::{ComputationResult, Pending};
    use crate::service::gate::VisibilityRules;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Echo {
        text: String,
        times: u32,
    }

    /// Echo operation: `times == 0` returns the text, otherwise a batch.
    struct EchoInvoker {
        calls: AtomicUsize,
    }

    impl OperationInvoker<String> for EchoInvoker {
        fn invoke(
            &self,
            _descriptor: &OperationDescriptor,
            _ctx: &RequestContext,
            input: TypedInput,
        ) -> ComputationResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let Ok(echo) = input.downcast::<Echo>() else {
                return Pending::faulted(vec![anyhow::anyhow!("wrong input type")]).into();
            };
            if echo.text == "fail" {
                return Pending::new(async { Err::<String, _>(anyhow::anyhow!("echo failed")) })
                    .into();
            }
            if echo.times == 0 {
                return ComputationResult::Value(echo.text);
            }
            (0..echo.times)
                .map(|i| {
                    let text = format!("{}#{i}", echo.text);
                    Pending::new(async move { Ok::<_, anyhow::Error>(text) })
                })
                .collect::<Vec<_>>()
                .into()
        }
    }

    /// Writer that records which method fired.
    #[derive(Default)]
    struct RecordingWriter {
        writes: AtomicUsize,
    }

    impl ResponseWriter<String> for RecordingWriter {
        type Output = (StatusCode, String);

        fn write_success(&self, _ctx: &RequestContext, value: Resolved<String>) -> Self::Output {
            self.writes.fetch_add(1, Ordering::SeqCst);
            (StatusCode::OK, serde_json::to_string(&value).unwrap())
        }

        fn write_error(&self, _ctx: &RequestContext, error: ClassifiedError) -> Self::Output {
            self.writes.fetch_add(1, Ordering::SeqCst);
            (error.status_code(), error.to_string())
        }
    }

    fn pipeline(config: &ServerConfig) -> (RequestPipeline<String>, Arc<EchoInvoker>) {
        let registry = Arc::new(OperationRegistry::new());
        registry.register::<Echo>("Echo");
        let invoker = Arc::new(EchoInvoker {
            calls: AtomicUsize::new(0),
        });
        let pipeline = RequestPipeline::new(
            config,
            registry,
            Arc::new(VisibilityRules::new()),
            DeserializerRegistry::with_defaults(),
            invoker.clone(),
        );
        (pipeline, invoker)
    }

    #[tokio::test]
    async fn get_query_flows_to_value() {
        let (pipeline, _) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::GET).with_query([("text", "hi")]);
        let writer = RecordingWriter::default();

        let (status, body) = pipeline.handle(&ctx, "Echo", &writer).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"hi\"");
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn json_body_batch_resolves_in_order() {
        let (pipeline, _) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::POST)
            .with_body("application/json", r#"{"text":"x","times":3}"#);

        let resolved = pipeline.execute(&ctx, "Echo").await.unwrap();
        assert_eq!(
            resolved.into_sequence(),
            Some(vec!["x#0".to_string(), "x#1".to_string(), "x#2".to_string()])
        );
    }

    #[tokio::test]
    async fn unknown_operation_is_not_invoked() {
        let (pipeline, invoker) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::GET);
        let err = pipeline.execute(&ctx, "Missing").await.unwrap_err();
        assert!(matches!(err, ClassifiedError::UnknownOperation { .. }));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_format_is_forbidden_before_binding() {
        let config = ServerConfig {
            enabled_features: Feature::MSGPACK,
            ..ServerConfig::default()
        };
        let (pipeline, invoker) = pipeline(&config);
        let ctx = RequestContext::new(Method::POST).with_body("application/json", "{oops");
        let writer = RecordingWriter::default();

        let (status, body) = pipeline.handle(&ctx, "Echo", &writer).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains(DenyReason::FeatureNotAvailable.as_str()));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_operation_name_is_written_by_the_gate() {
        let (pipeline, invoker) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::GET);
        let writer = RecordingWriter::default();

        let (status, _) = pipeline.handle(&ctx, "", &writer).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bad_body_is_bad_request_and_not_invoked() {
        let (pipeline, invoker) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::POST).with_body("application/json", "{oops");
        let writer = RecordingWriter::default();

        let (status, _) = pipeline.handle(&ctx, "Echo", &writer).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 0);

        let err = pipeline.execute(&ctx, "Echo").await.unwrap_err();
        assert_eq!(err.operation(), Some("Echo"));
    }

    #[tokio::test]
    async fn faulted_computation_writes_error_once() {
        let (pipeline, invoker) = pipeline(&ServerConfig::default());
        let ctx = RequestContext::new(Method::GET).with_query([("text", "fail")]);
        let writer = RecordingWriter::default();

        let (status, body) = pipeline.handle(&ctx, "Echo", &writer).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("echo failed"));
        assert_eq!(invoker.calls.load(Ordering::SeqCst), 1);
        assert_eq!(writer.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn debug_output_needs_both_mode_and_query_key() {
        let asked = RequestContext::new(Method::GET).with_query([("debug", "")]);
        let plain = RequestContext::new(Method::GET);

        let (off, _) = pipeline(&ServerConfig::default());
        assert!(!off.debug_requested(&asked));

        let config = ServerConfig {
            debug_mode: true,
            ..ServerConfig::default()
        };
        let (on, _) = pipeline(&config);
        assert!(on.debug_requested(&asked));
        assert!(!on.debug_requested(&plain));
    }
}
