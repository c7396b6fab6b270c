//! Demo host: registers a few sample operations and serves them.
//!
//! ```text
//! curl 'http://127.0.0.1:8080/json/reply/Hello?name=ada'
//! curl -X POST -H 'content-type: application/json' \
//!      -d '{"from":3,"delay_ms":50}' http://127.0.0.1:8080/json/reply/Countdown
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ferrule_core::{Feature, OperationDescriptor, RequestContext, TypedInput};
use ferrule_server::network::{init_local_addresses, NetworkConfig, NetworkModule};
use ferrule_server::service::{
    ComputationResult, DeserializerRegistry, OperationRegistry, Pending, RequestPipeline,
    ServerConfig, VisibilityRules,
};
use ferrule_server::traits::OperationInvoker;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Ferrule demo server
#[derive(Parser)]
#[command(name = "demo-server")]
#[command(about = "Serves sample Ferrule operations over HTTP")]
struct Cli {
    /// Bind address
    #[arg(long, env = "FERRULE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 picks a free port)
    #[arg(short, long, env = "FERRULE_PORT", default_value_t = 8080)]
    port: u16,

    /// Allow `?debug` output and the `/debug/operations` listing
    #[arg(long, env = "FERRULE_DEBUG")]
    debug: bool,

    /// Restrict the service to these features, e.g. `json,msgpack`
    #[arg(long, env = "FERRULE_FEATURES", value_delimiter = ',')]
    features: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, env = "FERRULE_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Emit logs as JSON lines
    #[arg(long, env = "FERRULE_LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Hello {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Add {
    a: i64,
    b: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Countdown {
    from: u32,
    delay_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
struct Status {}

/// Dispatches the sample operations by name.
struct DemoInvoker;

impl OperationInvoker<Value> for DemoInvoker {
    fn invoke(
        &self,
        descriptor: &OperationDescriptor,
        ctx: &RequestContext,
        input: TypedInput,
    ) -> ComputationResult<Value> {
        match descriptor.name() {
            "Hello" => typed(input, |hello: Hello| {
                let name = if hello.name.is_empty() { "world" } else { hello.name.as_str() };
                ComputationResult::Value(json!({ "greeting": format!("Hello, {name}!") }))
            }),
            "Add" => typed(input, |add: Add| {
                Pending::spawn(async move {
                    add.a
                        .checked_add(add.b)
                        .map(|sum| json!({ "sum": sum }))
                        .ok_or_else(|| anyhow::anyhow!("{} + {} overflows", add.a, add.b))
                })
                .into()
            }),
            "Countdown" => typed(input, countdown),
            "Status" => {
                let peer = ctx.remote_addr.map(|ip| ip.to_string());
                ComputationResult::Value(json!({
                    "status": "ok",
                    "peer": peer,
                    "attributes": format!("{:?}", ctx.attributes),
                }))
            }
            other => Pending::faulted(vec![anyhow::anyhow!("no handler for '{other}'")]).into(),
        }
    }
}

/// Largest `from` a single Countdown request may ask for.
const MAX_COUNTDOWN: u32 = 64;
/// Longest per-step delay a Countdown request may ask for.
const MAX_COUNTDOWN_STEP: Duration = Duration::from_secs(5);

fn countdown(countdown: Countdown) -> ComputationResult<Value> {
    if countdown.from > MAX_COUNTDOWN {
        return Pending::faulted(vec![anyhow::anyhow!(
            "countdown from {} exceeds the limit of {MAX_COUNTDOWN}",
            countdown.from
        )])
        .into();
    }
    let delay = Duration::from_millis(countdown.delay_ms).min(MAX_COUNTDOWN_STEP);
    (0..countdown.from)
        .map(|i| {
            let (completer, pending) = Pending::channel();
            let remaining = countdown.from - i;
            // Later elements finish first; the response keeps request order.
            tokio::spawn(async move {
                tokio::time::sleep(delay.saturating_mul(remaining)).await;
                completer.complete(json!(remaining));
            });
            pending
        })
        .collect::<Vec<_>>()
        .into()
}

fn typed<I: 'static>(
    input: TypedInput,
    run: impl FnOnce(I) -> ComputationResult<Value>,
) -> ComputationResult<Value> {
    match input.downcast::<I>() {
        Ok(value) => run(value),
        Err(other) => Pending::faulted(vec![anyhow::anyhow!(
            "unexpected input type {}",
            other.type_name()
        )])
        .into(),
    }
}

fn parse_features(names: &[String]) -> Result<Feature> {
    if names.is_empty() {
        return Ok(Feature::all());
    }
    names.iter().try_fold(Feature::empty(), |acc, name| {
        Feature::from_name(&name.trim().to_ascii_uppercase())
            .map(|feature| acc | feature)
            .ok_or_else(|| anyhow::anyhow!("unknown feature: {name}"))
    })
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ferrule_server=debug"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        fmt.json().init();
    } else {
        fmt.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let local = init_local_addresses();
    info!(addresses = local.len(), "network identity ready");

    let server_config = ServerConfig {
        enabled_features: parse_features(&cli.features)?,
        debug_mode: cli.debug,
    };

    let registry = Arc::new(OperationRegistry::new());
    registry.register::<Hello>("Hello");
    registry.register::<Add>("Add");
    registry.register::<Countdown>("Countdown");
    registry.register::<Status>("Status");

    let rules = VisibilityRules::new()
        .local_only("Status")
        .formats("Countdown", &["json"]);

    let pipeline: RequestPipeline<Value> = RequestPipeline::new(
        &server_config,
        registry,
        Arc::new(rules),
        DeserializerRegistry::with_defaults(),
        Arc::new(DemoInvoker),
    );

    let network_config = NetworkConfig {
        host: cli.host,
        port: cli.port,
        request_timeout: Duration::from_secs(cli.request_timeout_secs),
        ..NetworkConfig::default()
    };

    let mut module = NetworkModule::new(network_config, Arc::new(pipeline));
    let port = module.start().await?;
    info!(port, features = ?server_config.enabled_features, "demo server ready");

    module
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c, serving until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use ferrule_server::service::{Outcome, ResultResolver};

    use super::*;

    #[tokio::test]
    async fn countdown_over_limit_faults() {
        let result = countdown(Countdown {
            from: MAX_COUNTDOWN + 1,
            delay_ms: 0,
        });
        let ComputationResult::Pending(pending) = result else {
            panic!("expected a single faulted computation");
        };
        assert!(matches!(pending.outcome().await, Outcome::Faulted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_delay_is_clamped_and_keeps_order() {
        let result = countdown(Countdown {
            from: 3,
            delay_ms: u64::MAX,
        });
        let resolved = ResultResolver::new("Countdown").resolve(result).await.unwrap();
        assert_eq!(
            resolved.into_sequence(),
            Some(vec![json!(3), json!(2), json!(1)])
        );
    }
}
