use anyhow::{Context, Result, anyhow};
use embench_core::{
    BenchmarkSpec, Config, EvaluationRunner, ModelSpec, ModelStatus, Plan, ProgressEvent,
    ReportContext, ResultStore, ResumptionPlanner, RunSummary, RunnerConfig, ScoreCollector,
    TaskMap, backends::create_backend, completion_status, load_models,
    report::{ReportOutcome, write_reports},
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

/// Everything loaded from the harness configuration
pub struct App {
    pub config: Config,
    pub models: Vec<ModelSpec>,
    registry: TaskMap,
    store: ResultStore,
}

impl App {
    /// Load the model configuration and task map.
    ///
    /// A missing model configuration is fatal. A missing task map leaves
    /// every benchmark unresolved.
    pub fn new(config: Config) -> Result<Self> {
        let models = load_models(&config.models).with_context(|| {
            format!("loading model configuration {}", config.models.display())
        })?;
        info!(models = models.len(), path = %config.models.display(), "Loaded model configuration");

        let registry = match TaskMap::from_file(&config.task_map) {
            Ok(map) => {
                info!(benchmarks = map.len(), "Loaded benchmark task map");
                map
            }
            Err(e) => {
                error!(
                    path = %config.task_map.display(),
                    error = %e,
                    "Cannot read benchmark task map, no benchmark will resolve"
                );
                TaskMap::default()
            }
        };

        let store = ResultStore::new(&config.results_root);
        Ok(Self {
            config,
            models,
            registry,
            store,
        })
    }

    fn benchmarks(&self, keys: &[String]) -> Vec<BenchmarkSpec> {
        self.config.select_benchmarks(keys)
    }

    pub fn plan(&self, keys: &[String]) -> Plan {
        ResumptionPlanner::new(&self.registry, &self.store).plan(&self.models, &self.benchmarks(keys))
    }

    pub fn status(&self, keys: &[String]) -> Vec<ModelStatus> {
        completion_status(&self.models, &self.benchmarks(keys), &self.registry, &self.store)
    }

    /// Plan, then evaluate every pending task with a progress bar
    pub async fn run(&self, keys: &[String], workers: Option<usize>) -> Result<RunSummary> {
        let plan = self.plan(keys);
        info!(
            models = plan.queues.len(),
            tasks = plan.task_count(),
            complete = plan.complete.len(),
            "Planned run"
        );
        if plan.is_empty() {
            return Ok(RunSummary::default());
        }

        let backend_config = self
            .config
            .backend
            .as_ref()
            .ok_or_else(|| anyhow!("No evaluation backend configured"))?;
        let backend = create_backend(backend_config)?;

        let mut runner_config = RunnerConfig::from_config(&self.config);
        if let Some(workers) = workers {
            runner_config = runner_config.with_workers(workers);
        }

        let pb = progress_bar(plan.task_count() as u64)?;
        let hook_pb = pb.clone();
        let mut runner = EvaluationRunner::new(backend, self.store.clone(), runner_config)
            .with_progress(move |event| match event {
                ProgressEvent::ModelStarted { model, .. } => hook_pb.set_message(model.id.clone()),
                ProgressEvent::TaskFinished { .. } => hook_pb.inc(1),
                ProgressEvent::ModelFinished { .. } => {}
            });

        let summary = runner.run(&plan).await;
        pb.finish_with_message("done");
        Ok(summary)
    }

    pub fn report(&self) -> ReportOutcome {
        let collector = ScoreCollector::new(&self.store, &self.models);
        let ctx = ReportContext::new(collector, &self.registry);
        write_reports(&self.config.reports, &ctx)
    }
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
             {pos}/{len} tasks ({msg})",
        )?
        .progress_chars("#>-"),
    );
    Ok(pb)
}
