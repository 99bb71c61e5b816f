//! # Módulo de Telemetria
//!
//! Liga o `tracing` do engine a um subscriber: console sempre disponível e,
//! quando configurado, exportação OTLP dos spans.
//!
//! ## Spans emitidos pelo engine:
//!
//! ```text
//! file_run (file, environment)
//!   └─ test (position)
//!        └─ http_call (method, url)
//! ```
//!
//! Cada task da fila gera um `file_run`; os tokens substituídos já aparecem
//! no campo `url` do `http_call`.
//!
//! ## Configuração via variáveis de ambiente:
//!
//! - `OTEL_SERVICE_NAME`: nome do serviço nos traces
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: coletor OTLP (gRPC); ausente = só console
//! - `OTEL_TRACES_SAMPLER_ARG`: taxa de sampling (0.0-1.0)
//! - `RUNNER_LOG_LEVEL`: nível mínimo quando `RUST_LOG` não está definido
//!
//! Sempre chame `shutdown_telemetry()` antes de sair, senão o batch
//! exporter perde os spans pendentes.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::runtime::Tokio;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{trace as sdktrace, Resource};
use tracing::Level;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_SERVICE_NAME: &str = "suite-runner";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,

    /// Ex: "http://localhost:4317". `None` desliga o exporter.
    pub otlp_endpoint: Option<String>,

    /// Entre 0.0 e 1.0.
    pub sampling_ratio: f64,

    pub enable_console_logging: bool,

    /// Usado só quando `RUST_LOG` não está definido.
    pub log_level: Level,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            otlp_endpoint: None,
            sampling_ratio: 1.0,
            enable_console_logging: true,
            log_level: Level::INFO,
        }
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("OTEL_SERVICE_NAME").filter(|n| !n.trim().is_empty()) {
            config.service_name = name;
        }

        if let Some(endpoint) = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|e| !e.trim().is_empty()) {
            config.otlp_endpoint = Some(endpoint);
        }

        if let Some(r) = lookup("OTEL_TRACES_SAMPLER_ARG").and_then(|v| v.parse::<f64>().ok()) {
            config.sampling_ratio = r.clamp(0.0, 1.0);
        }

        if let Some(level) = lookup("RUNNER_LOG_LEVEL").and_then(|v| v.parse::<Level>().ok()) {
            config.log_level = level;
        }

        config
    }

    /// Nível mais verboso, para `--verbose` na CLI.
    pub fn verbose(mut self) -> Self {
        self.log_level = Level::DEBUG;
        self
    }
}

/// Instala o subscriber global.
///
/// Retorna o tracer OTLP quando um endpoint está configurado. Falha se um
/// subscriber global já tiver sido instalado.
pub fn init_telemetry(config: TelemetryConfig) -> anyhow::Result<Option<Tracer>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let console = config.enable_console_logging;

    match &config.otlp_endpoint {
        Some(endpoint) => {
            let tracer = init_otlp_tracer(&config.service_name, endpoint, config.sampling_ratio)?;

            tracing_subscriber::registry()
                .with(env_filter)
                .with(OpenTelemetryLayer::new(tracer.clone()))
                .with(console.then(|| tracing_subscriber::fmt::layer().compact().with_target(false)))
                .try_init()?;

            tracing::info!(
                service_name = %config.service_name,
                endpoint = %endpoint,
                sampling_ratio = config.sampling_ratio,
                "Telemetria OTLP inicializada"
            );
            Ok(Some(tracer))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console.then(|| tracing_subscriber::fmt::layer().compact().with_target(false)))
                .try_init()?;

            tracing::debug!("Telemetria inicializada (apenas console)");
            Ok(None)
        }
    }
}

fn sampler_for(ratio: f64) -> Sampler {
    if ratio >= 1.0 {
        Sampler::AlwaysOn
    } else if ratio <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(ratio)
    }
}

fn init_otlp_tracer(service_name: &str, endpoint: &str, sampling_ratio: f64) -> anyhow::Result<Tracer> {
    let exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(endpoint)
        .build_span_exporter()?;

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .with_config(
            sdktrace::Config::default()
                .with_sampler(sampler_for(sampling_ratio))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .build();

    let tracer = provider.tracer(service_name.to_string());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Faz flush dos spans pendentes e desliga o provider global.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
