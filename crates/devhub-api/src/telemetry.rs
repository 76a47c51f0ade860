use std::env;

use anyhow::Result;
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    resource::Resource,
    runtime::Tokio,
    trace::{self, Sampler},
};
use tracing::{info, warn};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SAMPLING_RATE_VAR: &str = "DEVHUB_OTEL_SAMPLING_RATE";
const ENABLED_VAR: &str = "DEVHUB_OTEL_ENABLED";

/// Flushes the OTLP pipeline on drop when one was installed.
#[derive(Debug)]
pub struct TelemetryGuard {
    exporting: bool,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exporting {
            global::shutdown_tracer_provider();
        }
    }
}

/// Installs console logging filtered by `RUST_LOG` (default `info`). Span
/// export over OTLP is opt-in through `DEVHUB_OTEL_ENABLED`; a failing
/// exporter degrades to console output only.
pub fn init(service_name: &str) -> Result<TelemetryGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let enabled = parse_enabled(env::var(ENABLED_VAR).ok().as_deref());
    let (sampling_rate, sampling_warning) =
        parse_sampling_rate(env::var(SAMPLING_RATE_VAR).ok().as_deref());

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    let mut otel_error = None;
    let exporting = if enabled {
        match build_otel_layer(service_name, sampling_rate) {
            Ok(Some(layer)) => {
                registry.with(layer).init();
                true
            }
            Ok(None) => {
                registry.init();
                false
            }
            Err(error) => {
                registry.init();
                otel_error = Some(error);
                false
            }
        }
    } else {
        registry.init();
        false
    };

    if let Some(message) = sampling_warning {
        warn!("{message}");
    }
    if let Some(error) = otel_error {
        warn!(%error, "failed to initialize OTLP exporter; continuing with console logs only");
    }
    info!(exporting, sampling_rate, "telemetry configured");

    Ok(TelemetryGuard { exporting })
}

fn build_otel_layer<S>(
    service_name: &str,
    sampling_rate: f64,
) -> Result<Option<OpenTelemetryLayer<S, trace::Tracer>>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    if sampling_rate <= 0.0 {
        return Ok(None);
    }

    global::set_text_map_propagator(TraceContextPropagator::new());

    let exporter = opentelemetry_otlp::new_exporter().tonic();
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_trace_config(
            trace::config()
                .with_sampler(Sampler::TraceIdRatioBased(sampling_rate))
                .with_resource(Resource::new(vec![KeyValue::new(
                    "service.name",
                    service_name.to_string(),
                )])),
        )
        .with_exporter(exporter)
        .install_batch(Tokio)?;

    Ok(Some(tracing_opentelemetry::layer().with_tracer(tracer)))
}

fn parse_enabled(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|value| value.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

/// Reads a head-sampling ratio. Missing or unparsable values fall back to
/// `1.0` and out-of-range values are clamped; both cases return a warning.
pub fn parse_sampling_rate(raw: Option<&str>) -> (f64, Option<String>) {
    let Some(value) = raw else {
        return (1.0, None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return (
            1.0,
            Some(format!("{SAMPLING_RATE_VAR} is empty; defaulting to 1.0")),
        );
    }

    match trimmed.parse::<f64>() {
        Ok(parsed) if (0.0..=1.0).contains(&parsed) => (parsed, None),
        Ok(parsed) if parsed.is_nan() => (
            1.0,
            Some(format!("{SAMPLING_RATE_VAR} is NaN; defaulting to 1.0")),
        ),
        Ok(parsed) => {
            let clamped = parsed.clamp(0.0, 1.0);
            (
                clamped,
                Some(format!(
                    "{SAMPLING_RATE_VAR}={trimmed} outside 0.0..=1.0; clamped to {clamped}"
                )),
            )
        }
        Err(_) => (
            1.0,
            Some(format!(
                "{SAMPLING_RATE_VAR}='{trimmed}' is not a valid float; defaulting to 1.0"
            )),
        ),
    }
}
