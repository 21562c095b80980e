//! Telemetry initialization.
//!
//! Events go to stderr, filtered by `RUST_LOG` (default `warn`), as compact
//! text or JSON lines (`--log-format` / `FORGEHUB_LOG_FORMAT`).
//!
//! With the `otel` feature, setting `OTEL_EXPORTER_OTLP_ENDPOINT` to an
//! `http://` URL additionally exports spans over OTLP HTTP.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Shape of the log lines written to stderr.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Opaque guard: dropping it flushes and shuts down the OTLP pipeline.
/// Hold this in `main()` until exit.
pub struct TelemetryGuard {
    #[cfg(feature = "otel")]
    trace_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        #[cfg(feature = "otel")]
        if let Some(provider) = self.trace_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("otel trace shutdown error: {e}");
        }
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Install the global subscriber.
///
/// Returns a guard that must be held until the program exits.
#[must_use]
pub fn init(format: LogFormat) -> TelemetryGuard {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

    match endpoint.as_deref() {
        None | Some("") => init_stderr(format),
        #[cfg(feature = "otel")]
        Some(_) => init_otlp(format),
        #[cfg(not(feature = "otel"))]
        Some(_) => {
            eprintln!("warning: OTEL_EXPORTER_OTLP_ENDPOINT set but forgehub built without 'otel' feature");
            init_stderr(format)
        }
    }
}

fn init_stderr(format: LogFormat) -> TelemetryGuard {
    let registry = tracing_subscriber::registry().with(filter());
    let result = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: tracing already initialized: {e}");
    }

    TelemetryGuard {
        #[cfg(feature = "otel")]
        trace_provider: None,
    }
}

/// OTLP HTTP span export alongside the stderr layer.
///
/// The SDK reads `OTEL_EXPORTER_OTLP_ENDPOINT` from the environment natively
/// and appends `/v1/traces`.
#[cfg(feature = "otel")]
fn init_otlp(format: LogFormat) -> TelemetryGuard {
    use opentelemetry::KeyValue;
    use opentelemetry::trace::TracerProvider as _;

    let span_exporter = match opentelemetry_otlp::SpanExporter::builder().with_http().build() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("warning: failed to init OTLP span exporter: {e}");
            return init_stderr(format);
        }
    };

    let resource = opentelemetry_sdk::Resource::builder()
        .with_attribute(KeyValue::new("service.name", env!("CARGO_PKG_NAME")))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .build();

    let trace_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
        .with_simple_exporter(span_exporter)
        .with_resource(resource)
        .build();

    let tracer = trace_provider.tracer(env!("CARGO_PKG_NAME"));
    let trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    let registry = tracing_subscriber::registry().with(filter()).with(trace_layer);
    let result = match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().compact().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: tracing already initialized: {e}");
    }

    TelemetryGuard {
        trace_provider: Some(trace_provider),
    }
}
