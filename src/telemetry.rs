use opentelemetry::global;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber. Spans are also exported to Jaeger when a
/// collector endpoint is given.
pub fn init(jaeger_endpoint: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let filter_layer = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let subscriber = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::Layer::default());

    let Some(endpoint) = jaeger_endpoint else {
        subscriber.try_init()?;
        return Ok(());
    };

    global::set_text_map_propagator(opentelemetry_jaeger::Propagator::new());

    let tracer = opentelemetry_jaeger::new_collector_pipeline()
        .with_endpoint(endpoint)
        .with_service_name("snailmail")
        .with_isahc()
        .with_timeout(std::time::Duration::from_secs(2))
        .install_batch(opentelemetry::runtime::Tokio)?;

    subscriber
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init()?;

    Ok(())
}

pub fn shutdown() {
    global::shutdown_tracer_provider();
}
