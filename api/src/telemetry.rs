use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// Installs the global subscriber. JSON lines by default so log shippers can
/// parse fields; `LOG_FORMAT=pretty` switches to human-readable output.
pub fn init_tracing(service: &'static str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let pretty = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("pretty"))
        .unwrap_or(false);

    let fmt_layer = if pretty {
        tracing_subscriber::fmt::layer().boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed()
    };

    Registry::default()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(service, "tracing initialised");
    Ok(())
}
