use tracing::debug;

use super::{ReportContext, SpeedDataReport};

const HEADER: &str = "model,score,evaluation_time,examples_per_sec,n_parameters,embedding_size";

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// CSV rows for every model directory with a result for the task
pub(crate) fn speed_data(report: &SpeedDataReport, ctx: &ReportContext<'_>) -> String {
    let mut lines = vec![HEADER.to_string()];
    let store = ctx.collector.store();

    for model_dir in store.model_dirs(&report.benchmark) {
        if report.exclude.contains(&model_dir) {
            continue;
        }
        let Some(artifact) = ctx
            .collector
            .artifact(&report.benchmark, &model_dir, None, &report.task)
        else {
            debug!(model = %model_dir, task = %report.task, "No result, skipping");
            continue;
        };
        let Some(score) = artifact.metric(&report.metric) else {
            debug!(model = %model_dir, metric = %report.metric, "Metric missing, skipping");
            continue;
        };

        let time = artifact.evaluation_time.filter(|t| *t > 0.0);
        let throughput = time.map(|t| format!("{:.2}", report.examples as f64 / t));
        let meta = ctx.collector.model_meta(&report.benchmark, &model_dir, None);

        lines.push(format!(
            "{model_dir},{score:.4},{},{},{},{}",
            optional(time.map(|t| format!("{t:.2}"))),
            optional(throughput),
            optional(meta.as_ref().and_then(|m| m.n_parameters)),
            optional(meta.as_ref().and_then(|m| m.embedding_size())),
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
