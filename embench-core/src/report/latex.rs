use tracing::warn;

use super::aggregate::{BEST_TOLERANCE, best_by_column, best_flags, mean, summarize};
use super::collect::MetricSelection;
use super::{
    BaselineDeltaReport, CategorySummaryReport, ReportContext, ReportModel,
    RetrievalMetricsReport, RetrievalSummaryReport, report_error,
};
use crate::error::Result;
use crate::types::TaskCategory;

/// Caption and label of a rendered table
pub(crate) struct TableMeta<'a> {
    pub caption: Option<&'a str>,
    pub label: Option<&'a str>,
}

/// Column header for a metric name
fn metric_label(metric: &str) -> String {
    match metric {
        "ndcg_at_10" => "nDCG@10".into(),
        "map_at_10" => "MAP@10".into(),
        "mrr_at_10" => "MRR@10".into(),
        "recall_at_10" => "Recall@10".into(),
        "main_score" => "Score".into(),
        other => other.replace('_', "\\_"),
    }
}

fn bold(text: &str) -> String {
    format!("\\textbf{{{text}}}")
}

/// Three-decimal score, `-` when absent
fn score_cell(value: Option<f64>, best: bool) -> String {
    match value {
        Some(v) if best => bold(&format!("{v:.3}")),
        Some(v) => format!("{v:.3}"),
        None => "-".into(),
    }
}

fn row(cells: &[String]) -> String {
    format!("{} \\\\", cells.join(" & "))
}

/// Wrap tabular body lines in a booktabs table environment
fn table(meta: &TableMeta<'_>, columns: &str, body: Vec<String>) -> String {
    let mut lines = vec!["\\begin{table}[ht]".to_string(), "\\centering".to_string()];
    if let Some(caption) = meta.caption {
        lines.push(format!("\\caption{{{caption}}}"));
    }
    if let Some(label) = meta.label {
        lines.push(format!("\\label{{{label}}}"));
    }
    lines.push(format!("\\begin{{tabular}}{{{columns}}}"));
    lines.push("\\toprule".into());
    lines.extend(body);
    lines.push("\\bottomrule".into());
    lines.push("\\end{tabular}".into());
    lines.push("\\end{table}".into());

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

pub(crate) fn baseline_delta(
    report: &BaselineDeltaReport,
    meta: &TableMeta<'_>,
    ctx: &ReportContext<'_>,
) -> Result<String> {
    let score_of = |model: &ReportModel| {
        ctx.collector.task_score(
            &report.benchmark,
            &model.dir,
            model.revision.as_deref(),
            &report.task,
            &report.metric,
        )
    };

    let baseline = report
        .models
        .iter()
        .find(|m| m.dir == report.baseline)
        .and_then(|m| score_of(m))
        .ok_or_else(|| {
            report_error(format!(
                "No {} result for baseline {} on {}",
                report.metric, report.baseline, report.task
            ))
        })?;

    let mut body = vec![
        row(&[
            bold("Model"),
            bold(&metric_label(&report.metric)),
            bold("$\\Delta$ vs.\\ baseline"),
        ]),
        "\\midrule".to_string(),
    ];

    for model in &report.models {
        let Some(score) = score_of(model) else {
            warn!(model = %model.dir, task = %report.task, "No result, leaving row out");
            continue;
        };

        let highlighted = report.highlight.as_deref() == Some(model.dir.as_str());
        let delta = if model.dir == report.baseline {
            "--".to_string()
        } else {
            format!("{:+.1} pp", (score - baseline) * 100.0)
        };
        body.push(row(&[
            model.label.clone(),
            score_cell(Some(score), highlighted),
            delta,
        ]));
    }

    Ok(table(meta, "lcc", body))
}

/// Metric values of one model, `None` when it has no result
struct MetricsRow {
    embedding_size: Option<u64>,
    params_millions: Option<f64>,
    values: Vec<Option<f64>>,
}

pub(crate) fn retrieval_metrics(
    report: &RetrievalMetricsReport,
    meta: &TableMeta<'_>,
    ctx: &ReportContext<'_>,
) -> Result<String> {
    if report.metrics.is_empty() {
        return Err(report_error("retrieval_metrics needs at least one metric"));
    }

    let groups: Vec<Vec<(&ReportModel, Option<MetricsRow>)>> = report
        .groups
        .iter()
        .map(|group| {
            group
                .models
                .iter()
                .map(|model| {
                    let revision = model.revision.as_deref();
                    let data = ctx
                        .collector
                        .artifact(&report.benchmark, &model.dir, revision, &report.task)
                        .map(|artifact| {
                            let model_meta =
                                ctx.collector.model_meta(&report.benchmark, &model.dir, revision);
                            MetricsRow {
                                embedding_size: model_meta.as_ref().and_then(|m| m.embedding_size()),
                                params_millions: model_meta.as_ref().and_then(|m| m.params_millions()),
                                values: report.metrics.iter().map(|m| artifact.metric(m)).collect(),
                            }
                        });
                    if data.is_none() {
                        warn!(model = %model.dir, task = %report.task, "No result");
                    }
                    (model, data)
                })
                .collect()
        })
        .collect();

    // Best per column across every group
    let columns: Vec<Vec<Option<f64>>> = groups
        .iter()
        .flatten()
        .map(|(_, data)| match data {
            Some(data) => data.values.clone(),
            None => vec![None; report.metrics.len()],
        })
        .collect();
    let mut best = best_by_column(&columns, BEST_TOLERANCE).into_iter();

    let width = report.metrics.len() + 3;
    let mut header = vec![bold("Model"), bold("Emb. size"), bold("\\#Params (M)")];
    header.extend(report.metrics.iter().map(|m| bold(&metric_label(m))));
    let mut body = vec![row(&header)];

    for (group, rows) in report.groups.iter().zip(&groups) {
        body.push("\\midrule".into());
        body.push(format!(
            "\\multicolumn{{{width}}}{{l}}{{\\textit{{{}}}}} \\\\",
            group.title
        ));
        for (model, data) in rows {
            let flags = best.next().unwrap_or_default();
            let mut cells = vec![model.label.clone()];
            match data {
                Some(data) => {
                    cells.push(
                        data.embedding_size
                            .map_or_else(|| "N/A".to_string(), |d| d.to_string()),
                    );
                    cells.push(
                        data.params_millions
                            .map_or_else(|| "N/A".to_string(), |p| format!("{p:.0}")),
                    );
                    cells.extend(
                        data.values
                            .iter()
                            .zip(flags.iter().copied().chain(std::iter::repeat(false)))
                            .map(|(value, best)| score_cell(*value, best)),
                    );
                }
                None => {
                    cells.push("N/A".into());
                    cells.push("N/A".into());
                    cells.extend(report.metrics.iter().map(|_| "-".to_string()));
                }
            }
            body.push(row(&cells));
        }
    }

    let mut out = table(meta, &format!("lcc{}", "c".repeat(report.metrics.len())), body);
    if let Some(footnote) = &report.footnote {
        out.push_str(&format!("% {footnote}\n"));
    }
    Ok(out)
}

pub(crate) fn category_summary(
    report: &CategorySummaryReport,
    meta: &TableMeta<'_>,
    ctx: &ReportContext<'_>,
) -> Result<String> {
    if report.categories.is_empty() {
        return Err(report_error("category_summary needs at least one category"));
    }

    let metric = MetricSelection::from_config(report.metric.as_deref());
    let tasks = report
        .benchmarks
        .iter()
        .map(|b| ctx.tasks_by_category(&b.name, &report.categories))
        .collect::<Result<Vec<_>>>()?;

    let rows: Vec<Vec<Option<f64>>> = report
        .models
        .iter()
        .map(|model| {
            report
                .benchmarks
                .iter()
                .zip(&tasks)
                .flat_map(|(benchmark, tasks)| {
                    let scores = ctx.collector.collect(
                        &benchmark.key,
                        &model.dir,
                        model.revision.as_deref(),
                        tasks,
                        &metric,
                    );
                    summarize(&model.label, &scores).columns()
                })
                .collect()
        })
        .collect();
    let best = best_by_column(&rows, BEST_TOLERANCE);

    let group_width = report.categories.len() + 2;
    let mut groups = vec![String::new()];
    let mut rules = Vec::new();
    let mut header = vec![bold("Model")];
    for (i, benchmark) in report.benchmarks.iter().enumerate() {
        let first = 2 + i * group_width;
        groups.push(format!(
            "\\multicolumn{{{group_width}}}{{c}}{{{}}}",
            bold(benchmark.title())
        ));
        rules.push(format!("\\cmidrule(lr){{{first}-{}}}", first + group_width - 1));
        header.extend(report.categories.iter().map(|c| bold(c.short_label())));
        header.push(bold("Mean (T)"));
        header.push(bold("Mean (TT)"));
    }

    let mut body = vec![row(&groups), rules.join(" "), row(&header), "\\midrule".into()];
    for ((model, values), flags) in report.models.iter().zip(&rows).zip(&best) {
        let mut cells = vec![model.label.clone()];
        cells.extend(
            values
                .iter()
                .zip(flags)
                .map(|(value, best)| score_cell(*value, *best)),
        );
        body.push(row(&cells));
    }

    let columns = format!("l{}", "c".repeat(group_width * report.benchmarks.len()));
    Ok(table(meta, &columns, body))
}

pub(crate) fn retrieval_summary(
    report: &RetrievalSummaryReport,
    meta: &TableMeta<'_>,
    ctx: &ReportContext<'_>,
) -> Result<String> {
    let mut header = vec![bold("Task"), bold("Dataset"), bold("Domain")];
    header.extend(report.models.iter().map(|m| bold(&m.label)));
    let mut body = vec![row(&header), "\\midrule".into()];

    for entry in &report.rows {
        let mut tasks = ctx
            .tasks_by_category(&entry.name, &[TaskCategory::Retrieval])?
            .into_iter()
            .flat_map(|(_, names)| names)
            .collect::<Vec<_>>();
        for extra in &entry.extra_tasks {
            if !tasks.contains(extra) {
                tasks.push(extra.clone());
            }
        }

        let values: Vec<Option<f64>> = report
            .models
            .iter()
            .map(|model| {
                let scores: Vec<f64> = tasks
                    .iter()
                    .filter_map(|task| {
                        ctx.collector.task_score(
                            &entry.key,
                            &model.dir,
                            model.revision.as_deref(),
                            task,
                            &report.metric,
                        )
                    })
                    .collect();
                mean(&scores)
            })
            .collect();
        let best = best_flags(&values, BEST_TOLERANCE);

        let domain = if entry.domain_specific {
            "$\\checkmark$"
        } else {
            "$\\times$"
        };
        let mut cells = vec![entry.task_label.clone(), entry.dataset.clone(), domain.to_string()];
        cells.extend(
            values
                .iter()
                .zip(best)
                .map(|(value, best)| score_cell(*value, best)),
        );
        body.push(row(&cells));
    }

    let columns = format!("llc{}", "c".repeat(report.models.len()));
    Ok(table(meta, &columns, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ModelMeta, ResultArtifact, ScoreRecord};
    use crate::registry::TaskMap;
    use crate::report::{ModelGroup, ReportBenchmark, RetrievalSummaryRow, ScoreCollector};
    use crate::store::ResultStore;
    use crate::types::ModelSpec;

    const META: TableMeta<'static> = TableMeta {
        caption: Some("Caption"),
        label: Some("tab:test"),
    };

    fn write(store: &ResultStore, bench: &str, model: &str, task: &str, metrics: &[(&str, f64)]) {
        let record = metrics
            .iter()
            .fold(ScoreRecord::default(), |r, (name, value)| r.with_metric(name, *value));
        ResultArtifact::new(task, record)
            .write_atomic(store.artifact_path(bench, &ModelSpec::new(model, "r1"), task))
            .unwrap();
    }

    fn model(label: &str, dir: &str) -> ReportModel {
        ReportModel {
            label: label.into(),
            dir: dir.into(),
            revision: None,
        }
    }

    fn task_map() -> TaskMap {
        TaskMap::from_str(
            r#"{
                "Chem": [
                    {"name": "C1", "type": "Classification"},
                    {"name": "C2", "type": "Classification"},
                    {"name": "K1", "type": "Clustering"},
                    {"name": "P1", "type": "PairClassification"},
                    {"name": "R1", "type": "Retrieval"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_baseline_delta() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        write(&store, "rx", "org/base", "T", &[("ndcg_at_10", 0.5)]);
        write(&store, "rx", "org/ours", "T", &[("ndcg_at_10", 0.532)]);

        let registry = TaskMap::default();
        let ctx = ReportContext::new(ScoreCollector::new(&store, &[]), &registry);
        let report = BaselineDeltaReport {
            benchmark: "rx".into(),
            task: "T".into(),
            metric: "ndcg_at_10".into(),
            baseline: "org__base".into(),
            highlight: Some("org__ours".into()),
            models: vec![
                model("Base", "org__base"),
                model("Ours", "org__ours"),
                model("Missing", "org__missing"),
            ],
        };

        let out = baseline_delta(&report, &META, &ctx).unwrap();
        assert!(out.contains("\\caption{Caption}"));
        assert!(out.contains("Base & 0.500 & -- \\\\"));
        assert!(out.contains("Ours & \\textbf{0.532} & +3.2 pp \\\\"));
        assert!(!out.contains("Missing"));

        let no_baseline = BaselineDeltaReport {
            baseline: "org__missing".into(),
            ..report
        };
        assert!(baseline_delta(&no_baseline, &META, &ctx).is_err());
    }

    #[test]
    fn test_retrieval_metrics_bolds_best_across_groups() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        write(&store, "rx", "org/a", "T", &[("map_at_10", 0.4), ("ndcg_at_10", 0.6)]);
        write(&store, "rx", "org/b", "T", &[("map_at_10", 0.5), ("ndcg_at_10", 0.55)]);
        let meta_path = store.model_meta_path("rx", "org__a", "r1");
        let meta = ModelMeta {
            embed_dim: Some(crate::artifact::EmbedDim::Single(768)),
            n_parameters: Some(137_000_000),
            ..Default::default()
        };
        std::fs::write(&meta_path, serde_json::to_vec(&meta).unwrap()).unwrap();

        let registry = TaskMap::default();
        let ctx = ReportContext::new(ScoreCollector::new(&store, &[]), &registry);
        let report = RetrievalMetricsReport {
            benchmark: "rx".into(),
            task: "T".into(),
            metrics: vec!["map_at_10".into(), "ndcg_at_10".into()],
            groups: vec![
                ModelGroup {
                    title: "Open".into(),
                    models: vec![model("A", "org__a"), model("None", "org__none")],
                },
                ModelGroup {
                    title: "Closed".into(),
                    models: vec![model("B", "org__b")],
                },
            ],
            footnote: None,
        };

        let out = retrieval_metrics(&report, &META, &ctx).unwrap();
        assert!(out.contains("\\multicolumn{5}{l}{\\textit{Open}} \\\\"));
        assert!(out.contains("A & 768 & 137 & 0.400 & \\textbf{0.600} \\\\"));
        assert!(out.contains("None & N/A & N/A & - & - \\\\"));
        assert!(out.contains("B & N/A & N/A & \\textbf{0.500} & 0.550 \\\\"));
    }

    #[test]
    fn test_category_summary_skips_empty_categories() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        write(&store, "chem", "org/a", "C1", &[("main_score", 0.8)]);
        write(&store, "chem", "org/a", "C2", &[("main_score", 0.6)]);
        write(&store, "chem", "org/a", "P1", &[("main_score", 0.9)]);
        write(&store, "chem", "org/b", "C1", &[("main_score", 0.5)]);

        let registry = task_map();
        let ctx = ReportContext::new(ScoreCollector::new(&store, &[]), &registry);
        let report = CategorySummaryReport {
            categories: vec![
                TaskCategory::Classification,
                TaskCategory::Clustering,
                TaskCategory::PairClassification,
            ],
            metric: None,
            benchmarks: vec![ReportBenchmark {
                key: "chem".into(),
                name: "Chem".into(),
                title: Some("ChemTEB".into()),
            }],
            models: vec![model("A", "org__a"), model("B", "org__b")],
        };

        let out = category_summary(&report, &META, &ctx).unwrap();
        assert!(out.contains("\\multicolumn{5}{c}{\\textbf{ChemTEB}}"));
        assert!(out.contains("\\cmidrule(lr){2-6}"));
        // Task mean 0.7667, type mean (0.7 + 0.9) / 2
        assert!(out.contains(
            "A & \\textbf{0.700} & - & \\textbf{0.900} & \\textbf{0.767} & \\textbf{0.800} \\\\"
        ));
        assert!(out.contains("B & 0.500 & - & - & 0.500 & 0.500 \\\\"));

        let unknown = CategorySummaryReport {
            benchmarks: vec![ReportBenchmark {
                key: "x".into(),
                name: "Nope".into(),
                title: None,
            }],
            ..report
        };
        assert!(category_summary(&unknown, &META, &ctx).is_err());
    }

    #[test]
    fn test_retrieval_summary_averages_retrieval_and_extra_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        write(&store, "chem", "org/a", "R1", &[("ndcg_at_10", 0.4)]);
        write(&store, "chem", "org/a", "X", &[("ndcg_at_10", 0.6)]);
        write(&store, "chem", "org/b", "R1", &[("ndcg_at_10", 0.45)]);

        let registry = task_map();
        let ctx = ReportContext::new(ScoreCollector::new(&store, &[]), &registry);
        let report = RetrievalSummaryReport {
            metric: "ndcg_at_10".into(),
            rows: vec![RetrievalSummaryRow {
                key: "chem".into(),
                name: "Chem".into(),
                task_label: "Chemistry Retrieval".into(),
                dataset: "ChemTEB".into(),
                domain_specific: true,
                extra_tasks: vec!["X".into(), "R1".into()],
            }],
            models: vec![model("A", "org__a"), model("B", "org__b"), model("C", "org__c")],
        };

        let out = retrieval_summary(&report, &META, &ctx).unwrap();
        assert!(out.contains(
            "Chemistry Retrieval & ChemTEB & $\\checkmark$ & \\textbf{0.500} & 0.450 & - \\\\"
        ));
    }
}
