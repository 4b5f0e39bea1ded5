pub mod aggregate;
pub mod collect;
mod latex;
mod speed;

pub use aggregate::{BEST_TOLERANCE, SummaryRow, best_by_column, best_flags, mean, summarize};
pub use collect::{MetricSelection, ScoreCollector};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::registry::{TaskRegistry, group_by_category};
use crate::types::TaskCategory;

/// One generated report file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub name: String,
    pub output: PathBuf,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: ReportKind,
}

/// Report layout, discriminated by `type` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReportKind {
    BaselineDelta(BaselineDeltaReport),
    RetrievalMetrics(RetrievalMetricsReport),
    CategorySummary(CategorySummaryReport),
    RetrievalSummary(RetrievalSummaryReport),
    SpeedData(SpeedDataReport),
}

impl ReportKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::BaselineDelta(_) => "baseline_delta",
            Self::RetrievalMetrics(_) => "retrieval_metrics",
            Self::CategorySummary(_) => "category_summary",
            Self::RetrievalSummary(_) => "retrieval_summary",
            Self::SpeedData(_) => "speed_data",
        }
    }
}

/// A model row or column of a report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportModel {
    /// Display text, written verbatim (may contain LaTeX)
    pub label: String,
    /// Model directory in the result store (e.g. "org__name")
    pub dir: String,
    /// Revision to read; resolved from the model configuration when unset
    #[serde(default)]
    pub revision: Option<String>,
}

fn default_retrieval_metric() -> String {
    TaskCategory::Retrieval.primary_metric().to_string()
}

fn default_retrieval_metrics() -> Vec<String> {
    vec!["map_at_10".into(), "mrr_at_10".into(), "ndcg_at_10".into()]
}

/// One task's metric per model, with the change against a baseline model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineDeltaReport {
    pub benchmark: String,
    pub task: String,
    #[serde(default = "default_retrieval_metric")]
    pub metric: String,
    /// Directory of the baseline model; must be one of `models`
    pub baseline: String,
    /// Directory of the model whose score is set in bold
    #[serde(default)]
    pub highlight: Option<String>,
    pub models: Vec<ReportModel>,
}

/// Retrieval metrics of one task for groups of models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalMetricsReport {
    pub benchmark: String,
    pub task: String,
    #[serde(default = "default_retrieval_metrics")]
    pub metrics: Vec<String>,
    pub groups: Vec<ModelGroup>,
    #[serde(default)]
    pub footnote: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelGroup {
    pub title: String,
    pub models: Vec<ReportModel>,
}

/// Per-category means of several benchmarks side by side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummaryReport {
    pub categories: Vec<TaskCategory>,
    /// Metric read for every task; the category's primary metric when unset
    #[serde(default)]
    pub metric: Option<String>,
    pub benchmarks: Vec<ReportBenchmark>,
    pub models: Vec<ReportModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBenchmark {
    /// Directory under the results root
    pub key: String,
    /// Name in the benchmark task map
    pub name: String,
    /// Column group heading; defaults to `name`
    #[serde(default)]
    pub title: Option<String>,
}

impl ReportBenchmark {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }
}

/// Mean retrieval score per benchmark (rows) and model (columns)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSummaryReport {
    #[serde(default = "default_retrieval_metric")]
    pub metric: String,
    pub rows: Vec<RetrievalSummaryRow>,
    pub models: Vec<ReportModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSummaryRow {
    pub key: String,
    pub name: String,
    pub task_label: String,
    pub dataset: String,
    #[serde(default)]
    pub domain_specific: bool,
    /// Tasks averaged in addition to the benchmark's retrieval tasks
    #[serde(default)]
    pub extra_tasks: Vec<String>,
}

/// Score and throughput of every model evaluated on one task, as CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeedDataReport {
    pub benchmark: String,
    pub task: String,
    #[serde(default = "default_retrieval_metric")]
    pub metric: String,
    /// Number of examples the task embeds, for examples per second
    pub examples: u64,
    /// Model directories left out
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Everything a report reads from
pub struct ReportContext<'a> {
    pub collector: ScoreCollector<'a>,
    pub registry: &'a dyn TaskRegistry,
}

impl<'a> ReportContext<'a> {
    pub fn new(collector: ScoreCollector<'a>, registry: &'a dyn TaskRegistry) -> Self {
        Self {
            collector,
            registry,
        }
    }

    /// Tasks of a benchmark grouped by `categories`, in category order
    pub(crate) fn tasks_by_category(
        &self,
        benchmark: &str,
        categories: &[TaskCategory],
    ) -> Result<Vec<(TaskCategory, Vec<String>)>> {
        let tasks = self.registry.resolve(benchmark)?;
        Ok(group_by_category(&tasks, categories))
    }
}

impl ReportConfig {
    /// Render the report contents
    pub fn render(&self, ctx: &ReportContext<'_>) -> Result<String> {
        let meta = latex::TableMeta {
            caption: self.caption.as_deref(),
            label: self.label.as_deref(),
        };
        match &self.kind {
            ReportKind::BaselineDelta(report) => latex::baseline_delta(report, &meta, ctx),
            ReportKind::RetrievalMetrics(report) => latex::retrieval_metrics(report, &meta, ctx),
            ReportKind::CategorySummary(report) => latex::category_summary(report, &meta, ctx),
            ReportKind::RetrievalSummary(report) => latex::retrieval_summary(report, &meta, ctx),
            ReportKind::SpeedData(report) => Ok(speed::speed_data(report, ctx)),
        }
    }

    /// Render and write the report, creating parent directories
    pub fn write(&self, ctx: &ReportContext<'_>) -> Result<PathBuf> {
        let contents = self.render(ctx)?;
        write_file(&self.output, &contents)?;
        Ok(self.output.clone())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

/// Outcome of rendering a batch of reports
#[derive(Debug, Default)]
pub struct ReportOutcome {
    pub written: Vec<PathBuf>,
    /// Report name and error message
    pub failed: Vec<(String, String)>,
}

/// Write every report; a failing report is logged and the rest still render
pub fn write_reports(reports: &[ReportConfig], ctx: &ReportContext<'_>) -> ReportOutcome {
    let mut outcome = ReportOutcome::default();
    for report in reports {
        match report.write(ctx) {
            Ok(path) => {
                info!(
                    report = %report.name,
                    kind = report.kind.type_name(),
                    path = %path.display(),
                    "Report written"
                );
                outcome.written.push(path);
            }
            Err(e) => {
                error!(report = %report.name, error = %e, "Report failed");
                outcome.failed.push((report.name.clone(), e.to_string()));
            }
        }
    }
    outcome
}

pub(crate) fn report_error(message: impl Into<String>) -> Error {
    Error::Report(message.into())
}
