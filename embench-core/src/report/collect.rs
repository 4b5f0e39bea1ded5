use std::collections::HashMap;

use crate::artifact::{ModelMeta, ResultArtifact};
use crate::store::ResultStore;
use crate::types::{ModelSpec, TaskCategory};

/// Which metric to read from an artifact
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MetricSelection {
    /// The category's primary metric (nDCG@10 for retrieval, main score otherwise)
    #[default]
    Primary,
    Named(String),
}

impl MetricSelection {
    /// A configured metric name, or the primary metric when unset
    pub fn from_config(metric: Option<&str>) -> Self {
        metric.map_or(Self::Primary, |m| Self::Named(m.to_string()))
    }

    pub fn metric_for(&self, category: TaskCategory) -> &str {
        match self {
            Self::Primary => category.primary_metric(),
            Self::Named(name) => name,
        }
    }
}

/// Reads scores out of a result store for reporting.
///
/// Revisions come from, in order: the report entry, the model
/// configuration, or the single revision directory on disk.
pub struct ScoreCollector<'a> {
    store: &'a ResultStore,
    declared: HashMap<String, String>,
}

impl<'a> ScoreCollector<'a> {
    pub fn new(store: &'a ResultStore, models: &[ModelSpec]) -> Self {
        let declared = models
            .iter()
            .map(|m| (m.dir_name(), m.revision.clone()))
            .collect();
        Self { store, declared }
    }

    pub fn store(&self) -> &ResultStore {
        self.store
    }

    pub fn revision(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: Option<&str>,
    ) -> Option<String> {
        let declared = revision.or_else(|| self.declared.get(model_dir).map(String::as_str));
        self.store.resolve_revision(benchmark, model_dir, declared)
    }

    pub fn artifact(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: Option<&str>,
        task: &str,
    ) -> Option<ResultArtifact> {
        let revision = self.revision(benchmark, model_dir, revision)?;
        self.store.load_artifact(benchmark, model_dir, &revision, task)
    }

    pub fn model_meta(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: Option<&str>,
    ) -> Option<ModelMeta> {
        let revision = self.revision(benchmark, model_dir, revision)?;
        self.store.load_model_meta(benchmark, model_dir, &revision)
    }

    /// One metric of one task, `None` when the result or the metric is missing
    pub fn task_score(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: Option<&str>,
        task: &str,
        metric: &str,
    ) -> Option<f64> {
        self.artifact(benchmark, model_dir, revision, task)?
            .metric(metric)
    }

    /// Resolved scores per category; tasks without data are left out
    pub fn collect(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: Option<&str>,
        tasks: &[(TaskCategory, Vec<String>)],
        metric: &MetricSelection,
    ) -> Vec<(TaskCategory, Vec<f64>)> {
        let Some(revision) = self.revision(benchmark, model_dir, revision) else {
            return tasks.iter().map(|(c, _)| (*c, Vec::new())).collect();
        };

        tasks
            .iter()
            .map(|(category, names)| {
                let metric = metric.metric_for(*category);
                let scores = names
                    .iter()
                    .filter_map(|task| {
                        self.store
                            .load_artifact(benchmark, model_dir, &revision, task)?
                            .metric(metric)
                    })
                    .collect();
                (*category, scores)
            })
            .collect()
    }
}
