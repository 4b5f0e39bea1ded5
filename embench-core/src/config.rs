use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::report::ReportConfig;
use crate::types::{BenchmarkSpec, ModelSpec, TaskCategory};

/// Top-level configuration for embench
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the result store
    pub results_root: PathBuf,
    /// JSON file mapping model identifier to revision
    pub models: PathBuf,
    /// JSON file mapping benchmark name to its task descriptors
    pub task_map: PathBuf,
    /// Directory for run log files (console only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Worker count handed to the evaluation backend
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Benchmarks known to this harness, in run order
    #[serde(default)]
    pub benchmarks: Vec<BenchmarkSpec>,
    /// Per-model load options, matched by substring of the model identifier
    #[serde(default)]
    pub profiles: Vec<ModelProfile>,
    /// Evaluation backend
    #[serde(default)]
    pub backend: Option<BackendConfig>,
    /// Report files rendered by `embench report`
    #[serde(default)]
    pub reports: Vec<ReportConfig>,
}

fn default_workers() -> usize {
    4
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn from_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn benchmark(&self, key: &str) -> Option<&BenchmarkSpec> {
        self.benchmarks.iter().find(|b| b.key == key)
    }

    /// Resolve a benchmark selection against the configured benchmarks.
    ///
    /// An empty selection means all of them. Unknown keys are logged and
    /// dropped; the order of the configuration is kept.
    pub fn select_benchmarks(&self, keys: &[String]) -> Vec<BenchmarkSpec> {
        if keys.is_empty() {
            return self.benchmarks.clone();
        }

        for key in keys {
            if self.benchmark(key).is_none() {
                warn!(benchmark = %key, "Unknown benchmark key, skipping");
            }
        }

        self.benchmarks
            .iter()
            .filter(|b| keys.iter().any(|k| k == &b.key))
            .cloned()
            .collect()
    }

    pub fn options_for(&self, model_id: &str) -> ModelOptions {
        ModelOptions::resolve(&self.profiles, model_id)
    }
}

/// Load options applied to every model whose identifier contains `matches`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelProfile {
    pub matches: String,
    #[serde(flatten)]
    pub options: ModelOptions,
}

/// Options passed to the backend when loading a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seq_length: Option<usize>,
    /// Floating point type for the weights (e.g. "bfloat16")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_remote_code: Option<bool>,
}

impl ModelOptions {
    /// Merge every profile matching `model_id`, later profiles winning
    pub fn resolve(profiles: &[ModelProfile], model_id: &str) -> Self {
        let mut options = Self::default();
        for profile in profiles {
            if model_id.contains(&profile.matches) {
                options.merge(&profile.options);
            }
        }
        options
    }

    /// Overlay the fields set in `other`
    pub fn merge(&mut self, other: &ModelOptions) {
        if let Some(prompts) = &other.prompts {
            match &mut self.prompts {
                Some(existing) => existing.merge(prompts),
                None => self.prompts = Some(prompts.clone()),
            }
        }
        if other.max_seq_length.is_some() {
            self.max_seq_length = other.max_seq_length;
        }
        if other.dtype.is_some() {
            self.dtype = other.dtype.clone();
        }
        if other.batch_size.is_some() {
            self.batch_size = other.batch_size;
        }
        if other.trust_remote_code.is_some() {
            self.trust_remote_code = other.trust_remote_code;
        }
    }

    /// Prompt for a task of the given category, if one is configured
    pub fn prompt_for(&self, category: TaskCategory) -> Option<&str> {
        self.prompts.as_ref()?.for_category(category)
    }
}

/// Instruction prefixes prepended by the model adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Prefix per non-retrieval task category
    #[serde(default)]
    pub categories: BTreeMap<TaskCategory, String>,
    /// Prefix for retrieval queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Prefix for retrieval documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
}

impl PromptConfig {
    pub fn merge(&mut self, other: &PromptConfig) {
        for (category, prompt) in &other.categories {
            self.categories.insert(*category, prompt.clone());
        }
        if other.query.is_some() {
            self.query = other.query.clone();
        }
        if other.document.is_some() {
            self.document = other.document.clone();
        }
    }

    pub fn for_category(&self, category: TaskCategory) -> Option<&str> {
        self.categories.get(&category).map(String::as_str)
    }
}

/// Evaluation backend configuration, discriminated by `type` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Worker(WorkerConfig),
}

/// External worker process speaking line-delimited JSON on stdin/stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Program and arguments (e.g. ["python", "worker.py"])
    pub command: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Limit for a model load (unbounded when unset)
    #[serde(default)]
    pub load_timeout_secs: Option<u64>,
    /// Limit for a single task evaluation (unbounded when unset)
    #[serde(default)]
    pub task_timeout_secs: Option<u64>,
    /// Grace period for the process to exit after unloading
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Parse the model configuration: a flat JSON object of id -> revision
pub fn parse_models(json: &str) -> Result<Vec<ModelSpec>> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let object = value.as_object().ok_or_else(|| {
        Error::Config("Model configuration must be a JSON object of id -> revision".into())
    })?;

    object
        .iter()
        .map(|(id, revision)| {
            let revision = revision.as_str().ok_or_else(|| {
                Error::Config(format!("Revision for model '{id}' must be a string"))
            })?;
            Ok(ModelSpec::new(id.clone(), revision))
        })
        .collect()
}

pub fn load_models(path: impl AsRef<Path>) -> Result<Vec<ModelSpec>> {
    let contents = std::fs::read_to_string(path)?;
    parse_models(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
results_root: results/ChEmbed
models: models/ChEmbed.json
task_map: artifacts/benchmark_tasks_map.json
log_dir: logs
benchmarks:
  - key: mteb
    name: "MTEB(eng, v2)"
  - key: chemteb
    name: "ChemTEB(latest)"
profiles:
  - matches: "ChEmbed"
    trust_remote_code: true
    prompts:
      categories:
        Classification: "classification: "
        Clustering: "clustering: "
      query: "search_query: "
      document: "search_document: "
  - matches: "ChEmbed-prog"
    max_seq_length: 2048
    prompts:
      categories:
        Clustering: "cluster: "
backend:
  type: worker
  command: ["python", "worker.py"]
  task_timeout_secs: 3600
"#;

    #[test]
    fn test_parse_config() {
        let config = Config::from_str(CONFIG).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.benchmarks.len(), 2);
        assert_eq!(config.benchmark("chemteb").unwrap().name, "ChemTEB(latest)");
        let Some(BackendConfig::Worker(worker)) = &config.backend else {
            panic!("expected worker backend");
        };
        assert_eq!(worker.command, vec!["python", "worker.py"]);
        assert_eq!(worker.task_timeout_secs, Some(3600));
        assert_eq!(worker.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_select_benchmarks_keeps_config_order_and_drops_unknown() {
        let config = Config::from_str(CONFIG).unwrap();
        assert_eq!(config.select_benchmarks(&[]).len(), 2);

        let selected =
            config.select_benchmarks(&["chemteb".into(), "nope".into(), "mteb".into()]);
        let keys: Vec<_> = selected.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["mteb", "chemteb"]);
    }

    #[test]
    fn test_profiles_merge_in_order() {
        let config = Config::from_str(CONFIG).unwrap();

        let options = config.options_for("BASF-AI/ChEmbed-prog");
        assert_eq!(options.trust_remote_code, Some(true));
        assert_eq!(options.max_seq_length, Some(2048));
        assert_eq!(
            options.prompt_for(TaskCategory::Classification),
            Some("classification: ")
        );
        assert_eq!(options.prompt_for(TaskCategory::Clustering), Some("cluster: "));
        assert_eq!(options.prompt_for(TaskCategory::Sts), None);

        let plain = config.options_for("BAAI/bge-small-en-v1.5");
        assert_eq!(plain, ModelOptions::default());
    }

    #[test]
    fn test_parse_models_preserves_order() {
        let models = parse_models(r#"{"zeta/b": "rev2", "alpha/a": "rev1"}"#).unwrap();
        assert_eq!(models[0], ModelSpec::new("zeta/b", "rev2"));
        assert_eq!(models[1], ModelSpec::new("alpha/a", "rev1"));
    }

    #[test]
    fn test_parse_models_rejects_non_string_revision() {
        assert!(parse_models(r#"{"a": 1}"#).is_err());
        assert!(parse_models(r#"["a"]"#).is_err());
    }
}
