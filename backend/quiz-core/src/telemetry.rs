use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use opentelemetry_sdk::Resource;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LogFormat};

const SERVICE_NAME: &str = "quizground-core";
const DEFAULT_FILTER: &str = "quizground_core=debug";

/// Flushes pending spans when dropped. Keep it alive for the life of the
/// process.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shut down OpenTelemetry: {}", e);
            }
        }
    }
}

/// Installs the global subscriber: env filter, text or JSON output, and an
/// OpenTelemetry layer when an OTLP endpoint is configured.
pub fn init_tracing(config: &Config) -> anyhow::Result<TelemetryGuard> {
    let provider = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => Some(build_provider(endpoint)?),
        None => None,
    };
    let tracer = provider.as_ref().map(|p| p.tracer(SERVICE_NAME));

    let (text_layer, json_layer) = match config.log_format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with(text_layer)
        .with(json_layer)
        .with(tracer.map(|t| tracing_opentelemetry::layer().with_tracer(t)))
        .try_init()?;

    if let Some(endpoint) = config.otlp_endpoint.as_deref() {
        tracing::info!("OpenTelemetry export enabled, endpoint: {}", endpoint);
    }

    Ok(TelemetryGuard { provider })
}

fn build_provider(endpoint: &str) -> anyhow::Result<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()?;

    let resource = Resource::builder_empty()
        .with_service_name(SERVICE_NAME)
        .with_attributes(vec![KeyValue::new(
            "service.version",
            env!("CARGO_PKG_VERSION"),
        )])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_installs_without_otlp() {
        let guard = init_tracing(&Config::default()).unwrap();
        assert!(guard.provider.is_none());
        tracing::info!("telemetry test event");
    }
}
