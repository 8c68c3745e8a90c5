use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Noisy dependencies are capped unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["sqlx=warn", "tower_http=info", "hyper=warn"];

fn env_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = vec![level.to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| target.to_string()));
    EnvFilter::new(directives.join(","))
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let builder = fmt()
        .with_env_filter(env_filter(&telemetry.log_level))
        .with_target(false)
        .with_span_events(FmtSpan::CLOSE);

    let installed = if telemetry.json {
        builder.json().with_current_span(true).flatten_event(true).try_init()
    } else {
        builder.compact().try_init()
    };

    installed.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
