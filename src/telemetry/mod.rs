//! Tracing and OpenTelemetry wiring.
//!
//! Every component logs through `tracing`. With an OTLP endpoint configured,
//! the subscriber additionally exports traces, metrics, and logs over gRPC;
//! without one it stays a plain fmt subscriber for local runs.

pub mod metrics;
pub mod work;

use crate::error::{Error, Result};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

/// Keeps the OTel providers alive; flushes and shuts them down on drop.
///
/// Hold it in `main` for the process lifetime. Dropping it early silently
/// stops export.
pub struct TelemetryGuard {
    otel: Option<OtelProviders>,
}

struct OtelProviders {
    traces: SdkTracerProvider,
    meters: SdkMeterProvider,
    logs: SdkLoggerProvider,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(otel) = self.otel.take() {
            let _ = otel.logs.shutdown();
            let _ = otel.meters.shutdown();
            let _ = otel.traces.shutdown();
        }
    }
}

/// Install the global tracing subscriber, exporting over OTLP when
/// `endpoint` is set.
///
/// # Errors
///
/// Fails if an OTLP exporter cannot be built or a subscriber has already
/// been installed in this process.
pub fn init(service_name: &str, endpoint: Option<&str>) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let Some(endpoint) = endpoint else {
        registry
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;
        return Ok(TelemetryGuard { otel: None });
    };

    let resource = Resource::builder()
        .with_service_name(service_name.to_owned())
        .build();
    let otel = build_otlp_providers(endpoint, resource)?;

    opentelemetry::global::set_meter_provider(otel.meters.clone());

    let tracer = otel.traces.tracer("parcelq-rs");
    let log_bridge =
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&otel.logs);

    // fmt stays on next to OTLP so the queue is watchable from a terminal too
    registry
        .with(tracing_subscriber::fmt::layer().compact())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(log_bridge)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { otel: Some(otel) })
}

fn build_otlp_providers(endpoint: &str, resource: Resource) -> Result<OtelProviders> {
    use opentelemetry_otlp::WithExportConfig as _;

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("OTLP span exporter: {e}")))?;
    let traces = SdkTracerProvider::builder()
        .with_batch_exporter(span_exporter)
        .with_resource(resource.clone())
        .build();

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("OTLP metric exporter: {e}")))?;
    let meters = SdkMeterProvider::builder()
        .with_periodic_exporter(metric_exporter)
        .with_resource(resource.clone())
        .build();

    let log_exporter = opentelemetry_otlp::LogExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| Error::Other(format!("OTLP log exporter: {e}")))?;
    let logs = SdkLoggerProvider::builder()
        .with_batch_exporter(log_exporter)
        .with_resource(resource)
        .build();

    Ok(OtelProviders {
        traces,
        meters,
        logs,
    })
}
