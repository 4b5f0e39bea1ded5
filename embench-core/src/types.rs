use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Separator substituted for `/` in model identifiers when building paths
pub const MODEL_DIR_SEPARATOR: &str = "__";

/// Map a model identifier to a single filesystem-safe path segment.
///
/// `org/name` becomes `org__name`, so the namespace never turns into a
/// nested directory.
pub fn model_dir_name(model_id: &str) -> String {
    model_id.replace('/', MODEL_DIR_SEPARATOR)
}

/// A model pinned to a revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Model identifier (e.g. "nomic-ai/nomic-embed-text-v1")
    pub id: String,
    /// Revision (commit hash or tag) pinning the snapshot
    pub revision: String,
}

impl ModelSpec {
    pub fn new(id: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            revision: revision.into(),
        }
    }

    /// Directory segment for this model inside a results tree
    pub fn dir_name(&self) -> String {
        model_dir_name(&self.id)
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.revision)
    }
}

/// Evaluation task category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskCategory {
    Classification,
    MultilabelClassification,
    Clustering,
    PairClassification,
    Reranking,
    #[serde(rename = "STS")]
    Sts,
    Summarization,
    Retrieval,
}

impl TaskCategory {
    pub const ALL: [TaskCategory; 8] = [
        TaskCategory::Classification,
        TaskCategory::MultilabelClassification,
        TaskCategory::Clustering,
        TaskCategory::PairClassification,
        TaskCategory::Reranking,
        TaskCategory::Sts,
        TaskCategory::Summarization,
        TaskCategory::Retrieval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "Classification",
            Self::MultilabelClassification => "MultilabelClassification",
            Self::Clustering => "Clustering",
            Self::PairClassification => "PairClassification",
            Self::Reranking => "Reranking",
            Self::Sts => "STS",
            Self::Summarization => "Summarization",
            Self::Retrieval => "Retrieval",
        }
    }

    /// Column header used in report tables
    pub fn short_label(&self) -> &'static str {
        match self {
            Self::Classification => "Cls",
            Self::MultilabelClassification => "MLCls",
            Self::Clustering => "Clust",
            Self::PairClassification => "Pair",
            Self::Reranking => "Rerank",
            Self::Sts => "STS",
            Self::Summarization => "Summ",
            Self::Retrieval => "Retr",
        }
    }

    /// Metric that summarizes a task of this category
    pub fn primary_metric(&self) -> &'static str {
        match self {
            Self::Retrieval => "ndcg_at_10",
            _ => "main_score",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| Error::Config(format!("Unknown task category: {s}")))
    }
}

/// A single task within a benchmark
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub category: TaskCategory,
    /// Display name of the benchmark this task belongs to
    pub benchmark: String,
}

/// A benchmark selected for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkSpec {
    /// Directory segment under the results root (e.g. "chemteb")
    pub key: String,
    /// Name in the benchmark task map (e.g. "ChemTEB(latest)")
    pub name: String,
}

impl BenchmarkSpec {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}
