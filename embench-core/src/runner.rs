use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::artifact::ResultArtifact;
use crate::backend::{EvaluationJob, LoadRequest, LoadedModel, ModelBackend};
use crate::config::{Config, ModelOptions, ModelProfile};
use crate::error::{Error, Result};
use crate::planner::{ModelQueue, Plan};
use crate::store::ResultStore;
use crate::types::{BenchmarkSpec, ModelSpec, TaskDescriptor};

/// Settings shared by every model of a run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub workers: usize,
    pub profiles: Vec<ModelProfile>,
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.workers,
            profiles: config.profiles.clone(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Progress notifications emitted while a plan executes
#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    ModelStarted { model: &'a ModelSpec, tasks: usize },
    TaskFinished {
        model: &'a ModelSpec,
        benchmark: &'a str,
        task: &'a str,
        success: bool,
    },
    ModelFinished { model: &'a ModelSpec },
}

type ProgressHook = Arc<dyn Fn(&ProgressEvent<'_>) + Send + Sync>;

/// A task that did not produce a valid artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub benchmark: String,
    pub task: String,
    pub error: String,
}

/// What happened to one model queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOutcome {
    pub model: ModelSpec,
    /// Set when the model could not be loaded; none of its tasks ran
    pub load_error: Option<String>,
    pub succeeded: usize,
    pub failures: Vec<TaskFailure>,
    pub not_run: usize,
}

impl ModelOutcome {
    fn new(model: ModelSpec) -> Self {
        Self {
            model,
            load_error: None,
            succeeded: 0,
            failures: Vec::new(),
            not_run: 0,
        }
    }
}

/// Totals of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<ModelOutcome>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
        }
    }

    pub fn models_loaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.load_error.is_none()).count()
    }

    pub fn tasks_succeeded(&self) -> usize {
        self.outcomes.iter().map(|o| o.succeeded).sum()
    }

    pub fn tasks_failed(&self) -> usize {
        self.outcomes.iter().map(|o| o.failures.len()).sum()
    }

    pub fn tasks_not_run(&self) -> usize {
        self.outcomes.iter().map(|o| o.not_run).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.tasks_failed() == 0 && self.tasks_not_run() == 0
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes a plan one model and one task at a time
pub struct EvaluationRunner {
    backend: Box<dyn ModelBackend>,
    store: ResultStore,
    config: RunnerConfig,
    progress: Option<ProgressHook>,
}

impl EvaluationRunner {
    pub fn new(backend: Box<dyn ModelBackend>, store: ResultStore, config: RunnerConfig) -> Self {
        Self {
            backend,
            store,
            config,
            progress: None,
        }
    }

    /// Register a callback for progress events
    pub fn with_progress(
        mut self,
        hook: impl Fn(&ProgressEvent<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(hook));
        self
    }

    /// Get backend name
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn emit(&self, event: ProgressEvent<'_>) {
        if let Some(hook) = &self.progress {
            hook(&event);
        }
    }

    /// Run every queue of the plan sequentially
    pub async fn run(&mut self, plan: &Plan) -> RunSummary {
        let mut summary = RunSummary::new();

        info!(
            backend = self.backend.name(),
            models = plan.queues.len(),
            tasks = plan.task_count(),
            workers = self.config.workers,
            "Starting evaluation"
        );

        for queue in &plan.queues {
            let outcome = self.run_queue(queue).await;
            summary.outcomes.push(outcome);
        }

        summary.finished_at = Some(Utc::now());
        info!(
            succeeded = summary.tasks_succeeded(),
            failed = summary.tasks_failed(),
            not_run = summary.tasks_not_run(),
            "Evaluation finished"
        );
        summary
    }

    /// Load the model once, evaluate all of its pending tasks, unload it
    pub async fn run_queue(&mut self, queue: &ModelQueue) -> ModelOutcome {
        let model_spec = &queue.model;
        let mut outcome = ModelOutcome::new(model_spec.clone());
        let options = ModelOptions::resolve(&self.config.profiles, &model_spec.id);
        let request = LoadRequest {
            model: model_spec.clone(),
            options,
            workers: self.config.workers,
        };

        self.emit(ProgressEvent::ModelStarted {
            model: model_spec,
            tasks: queue.task_count(),
        });

        info!(model = %model_spec, tasks = queue.task_count(), "Loading model");
        let start = Instant::now();
        let mut model = match self.backend.load(&request).await {
            Ok(model) => model,
            Err(e) => {
                error!(model = %model_spec, error = %e, "Model load failed, skipping its tasks");
                outcome.load_error = Some(e.to_string());
                outcome.not_run = queue.task_count();
                self.emit(ProgressEvent::ModelFinished { model: model_spec });
                return outcome;
            }
        };
        debug!(model = %model_spec, elapsed_ms = start.elapsed().as_millis(), "Model loaded");

        for item in &queue.items {
            info!(
                model = %model_spec,
                benchmark = %item.benchmark.key,
                tasks = item.tasks.len(),
                "Running benchmark"
            );

            for task in &item.tasks {
                let result = self
                    .evaluate_task(model.as_mut(), &request, &item.benchmark, task)
                    .await;

                let success = result.is_ok();
                match result {
                    Ok(()) => outcome.succeeded += 1,
                    Err(e) => {
                        error!(
                            model = %model_spec,
                            benchmark = %item.benchmark.key,
                            task = %task.name,
                            error = %e,
                            "Task failed"
                        );
                        outcome.failures.push(TaskFailure {
                            benchmark: item.benchmark.key.clone(),
                            task: task.name.clone(),
                            error: e.to_string(),
                        });
                    }
                }

                if let Err(e) = model.reclaim().await {
                    warn!(model = %model_spec, error = %e, "Reclaim after task failed");
                }

                self.emit(ProgressEvent::TaskFinished {
                    model: model_spec,
                    benchmark: &item.benchmark.key,
                    task: &task.name,
                    success,
                });
            }
        }

        if let Err(e) = model.unload().await {
            warn!(model = %model_spec, error = %e, "Unloading model failed");
        }

        info!(
            model = %model_spec,
            succeeded = outcome.succeeded,
            failed = outcome.failures.len(),
            elapsed_s = start.elapsed().as_secs(),
            "Model done"
        );
        self.emit(ProgressEvent::ModelFinished { model: model_spec });
        outcome
    }

    /// Evaluate a single task and confirm the artifact landed
    async fn evaluate_task(
        &self,
        model: &mut dyn LoadedModel,
        request: &LoadRequest,
        benchmark: &BenchmarkSpec,
        task: &TaskDescriptor,
    ) -> Result<()> {
        let output_dir = self.store.revision_dir_for(&benchmark.key, &request.model);
        tokio::fs::create_dir_all(&output_dir).await?;

        let job = EvaluationJob {
            benchmark: benchmark.key.clone(),
            task: task.clone(),
            prompt: request.options.prompt_for(task.category).map(str::to_owned),
            output_path: self
                .store
                .artifact_path(&benchmark.key, &request.model, &task.name),
            output_dir,
            workers: request.workers,
        };

        let start = Instant::now();
        model.evaluate(&job).await?;

        if ResultArtifact::load_complete(&job.output_path).is_none() {
            return Err(Error::Evaluation(format!(
                "no valid artifact at {} after evaluating {}",
                job.output_path.display(),
                task.name
            )));
        }

        info!(
            task = %task.name,
            category = %task.category,
            elapsed_s = start.elapsed().as_secs(),
            "Task completed"
        );
        Ok(())
    }
}
