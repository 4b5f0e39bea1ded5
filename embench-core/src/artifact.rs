use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File extension of result artifacts
pub const RESULT_EXTENSION: &str = "json";
/// Reserved file holding model metadata, never a task result
pub const MODEL_META_FILE: &str = "model_meta.json";
/// Split whose first score record marks an artifact as complete
pub const EVAL_SPLIT: &str = "test";

/// One score record of a split: metric name -> value.
///
/// Records also carry non-numeric fields (subset name, languages) which
/// are kept but never reported as metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(flatten)]
    pub values: serde_json::Map<String, serde_json::Value>,
}

impl ScoreRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.values.get(name)?.as_f64()
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }
}

/// Persisted outcome of one task for one model revision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    /// Split name -> ordered score records
    pub scores: BTreeMap<String, Vec<ScoreRecord>>,
    /// Wall-clock evaluation time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_time: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ResultArtifact {
    /// Artifact with a single evaluation-split record
    pub fn new(task_name: impl Into<String>, record: ScoreRecord) -> Self {
        let mut scores = BTreeMap::new();
        scores.insert(EVAL_SPLIT.to_string(), vec![record]);
        Self {
            task_name: Some(task_name.into()),
            scores,
            evaluation_time: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_evaluation_time(mut self, seconds: f64) -> Self {
        self.evaluation_time = Some(seconds);
        self
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read(path)?;
        Self::from_slice(&contents)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Load only if the file holds a complete artifact
    pub fn load_complete(path: impl AsRef<Path>) -> Option<Self> {
        Self::from_file(path).ok().filter(Self::is_complete)
    }

    /// First record of the evaluation split
    pub fn primary_record(&self) -> Option<&ScoreRecord> {
        self.scores.get(EVAL_SPLIT)?.first()
    }

    pub fn is_complete(&self) -> bool {
        self.primary_record().is_some()
    }

    /// Metric from the first evaluation-split record
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.primary_record()?.metric(name)
    }

    /// Write via a temporary sibling and rename, so readers never see a
    /// partially written artifact.
    pub fn write_atomic(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Embedding dimension, reported either as a number or a list of sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbedDim {
    Single(u64),
    Multiple(Vec<u64>),
}

impl EmbedDim {
    pub fn primary(&self) -> Option<u64> {
        match self {
            Self::Single(dim) => Some(*dim),
            Self::Multiple(dims) => dims.first().copied(),
        }
    }
}

/// Contents of `model_meta.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMeta {
    #[serde(default)]
    pub embed_dim: Option<EmbedDim>,
    #[serde(default)]
    pub n_parameters: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelMeta {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read(path)?;
        Ok(serde_json::from_slice(&contents)?)
    }

    pub fn embedding_size(&self) -> Option<u64> {
        self.embed_dim.as_ref()?.primary()
    }

    /// Parameter count in millions
    pub fn params_millions(&self) -> Option<f64> {
        self.n_parameters
            .filter(|n| *n > 0)
            .map(|n| n as f64 / 1e6)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mteb_artifact() {
        let json = br#"{
            "dataset_revision": "abc",
            "task_name": "ChemRxivRetrieval",
            "mteb_version": "2.0.0",
            "scores": {
                "test": [{
                    "ndcg_at_10": 0.812,
                    "map_at_10": 0.75,
                    "main_score": 0.812,
                    "hf_subset": "default",
                    "languages": ["eng-Latn"]
                }]
            },
            "evaluation_time": 1234.5
        }"#;

        let artifact = ResultArtifact::from_slice(json).unwrap();
        assert!(artifact.is_complete());
        assert_eq!(artifact.metric("ndcg_at_10"), Some(0.812));
        assert_eq!(artifact.metric("hf_subset"), None);
        assert_eq!(artifact.metric("mrr_at_10"), None);
        assert_eq!(artifact.evaluation_time, Some(1234.5));
        assert_eq!(artifact.extra["mteb_version"], "2.0.0");
    }

    #[test]
    fn test_incomplete_artifacts() {
        let empty_split = ResultArtifact::from_slice(br#"{"scores": {"test": []}}"#).unwrap();
        assert!(!empty_split.is_complete());

        let other_split =
            ResultArtifact::from_slice(br#"{"scores": {"validation": [{"main_score": 1.0}]}}"#)
                .unwrap();
        assert!(!other_split.is_complete());

        assert!(ResultArtifact::from_slice(br#"{"task_name": "T1"}"#).is_err());
        assert!(ResultArtifact::from_slice(b"{not json").is_err());
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/T1.json");
        let artifact =
            ResultArtifact::new("T1", ScoreRecord::default().with_metric("main_score", 0.5));

        artifact.write_atomic(&path).unwrap();

        let loaded = ResultArtifact::load_complete(&path).unwrap();
        assert_eq!(loaded.metric("main_score"), Some(0.5));
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("T1.json")]);
    }

    #[test]
    fn test_model_meta_dims() {
        let meta: ModelMeta =
            serde_json::from_str(r#"{"embed_dim": [768, 256], "n_parameters": 137000000}"#)
                .unwrap();
        assert_eq!(meta.embedding_size(), Some(768));
        assert_eq!(meta.params_millions(), Some(137.0));

        let closed: ModelMeta = serde_json::from_str(r#"{"embed_dim": 1536}"#).unwrap();
        assert_eq!(closed.embedding_size(), Some(1536));
        assert_eq!(closed.params_millions(), None);
    }
}
