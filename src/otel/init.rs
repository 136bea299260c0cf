//! Subscriber setup: plain `fmt` logging, or `fmt` plus an OTLP exporter.

use crate::types::{ChatError, Result};
use opentelemetry::{trace::TracerProvider as _, KeyValue};
use opentelemetry_sdk::Resource;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Flushes pending spans when dropped.
pub struct OtelGuard {
    tracer_provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl OtelGuard {
    /// Whether spans are being exported.
    pub fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("error shutting down tracer provider: {}", e);
            }
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

/// Install the global subscriber.
///
/// Exports spans over OTLP/gRPC only when `SQLCHAT_ENABLE_TRACING` is truthy and
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set. `SQLCHAT_LOG_FORMAT=json` switches console
/// output to JSON lines.
///
/// # Errors
///
/// Returns `ChatError::Config` if the exporter cannot be built
pub fn init_tracing(service_name: &str) -> Result<OtelGuard> {
    let enabled = env::var("SQLCHAT_ENABLE_TRACING")
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let json = env::var("SQLCHAT_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|e| !e.is_empty());

    let endpoint_url = match endpoint {
        Some(url) if enabled => url,
        _ => {
            let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
            // try_init: a second call (tests, embedding) keeps the first subscriber
            let _ = if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            };

            tracing::info!(service = service_name, "basic logging initialized");
            return Ok(OtelGuard {
                tracer_provider: None,
            });
        }
    };

    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&endpoint_url)
        .build()
        .map_err(|e| ChatError::Config(format!("OTLP exporter build failed: {}", e)))?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.to_string(),
        )]))
        .build();

    let telemetry =
        tracing_opentelemetry::layer().with_tracer(provider.tracer(service_name.to_string()));

    let registry = tracing_subscriber::registry()
        .with(telemetry)
        .with(env_filter());
    let _ = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    tracing::info!(
        service = service_name,
        endpoint = %endpoint_url,
        "opentelemetry tracing initialized"
    );

    Ok(OtelGuard {
        tracer_provider: Some(provider),
    })
}
