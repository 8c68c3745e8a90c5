use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

pub(crate) fn record_submission(outcome: &'static str) {
    metrics::counter!("quiz_submissions_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_autograde(is_correct: bool) {
    let result = if is_correct { "correct" } else { "incorrect" };
    metrics::counter!("quiz_answers_autograded_total", "result" => result).increment(1);
}

pub(crate) fn record_manual_grade() {
    metrics::counter!("quiz_answers_graded_total").increment(1);
}
