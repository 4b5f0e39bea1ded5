use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ModelOptions;
use crate::error::Result;
use crate::types::{ModelSpec, TaskDescriptor};

/// Everything a backend needs to load a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub model: ModelSpec,
    pub options: ModelOptions,
    /// Data-loading/scoring parallelism inside the backend
    pub workers: usize,
}

/// One task evaluation for an already loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationJob {
    /// Benchmark key (results directory segment)
    pub benchmark: String,
    pub task: TaskDescriptor,
    /// Instruction prefix for the task's category, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Revision directory the artifact belongs in
    pub output_dir: PathBuf,
    /// Expected artifact file
    pub output_path: PathBuf,
    pub workers: usize,
}

/// Trait for evaluation backends (the external model/benchmark stack)
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human-readable name for this backend
    fn name(&self) -> &str;

    /// Load a model; the handle is reused for all of its pending tasks
    async fn load(&self, request: &LoadRequest) -> Result<Box<dyn LoadedModel>>;
}

/// A model held in memory by a backend
#[async_trait]
pub trait LoadedModel: Send {
    fn spec(&self) -> &ModelSpec;

    /// Evaluate one task and persist its artifact at `job.output_path`
    async fn evaluate(&mut self, job: &EvaluationJob) -> Result<()>;

    /// Release transient memory after a task
    async fn reclaim(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release the model itself
    async fn unload(self: Box<Self>) -> Result<()>;
}
