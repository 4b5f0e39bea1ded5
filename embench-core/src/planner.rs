use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::registry::TaskRegistry;
use crate::store::ResultStore;
use crate::types::{BenchmarkSpec, ModelSpec, TaskDescriptor};

/// Tasks of one benchmark still lacking a complete artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWorkItem {
    pub benchmark: BenchmarkSpec,
    /// Sorted by task name
    pub tasks: Vec<TaskDescriptor>,
}

impl PendingWorkItem {
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }
}

/// All pending work for one model, evaluated under a single model load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelQueue {
    pub model: ModelSpec,
    pub items: Vec<PendingWorkItem>,
}

impl ModelQueue {
    pub fn task_count(&self) -> usize {
        self.items.iter().map(|i| i.tasks.len()).sum()
    }

    /// Pending task names for a benchmark key
    pub fn missing(&self, benchmark: &str) -> Vec<&str> {
        self.items
            .iter()
            .find(|i| i.benchmark.key == benchmark)
            .map(PendingWorkItem::task_names)
            .unwrap_or_default()
    }
}

/// Outcome of planning a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// One queue per model with pending work, in configuration order
    pub queues: Vec<ModelQueue>,
    /// Models with nothing left to do
    pub complete: Vec<ModelSpec>,
    /// Benchmarks whose definition could not be resolved
    pub unresolved: Vec<String>,
}

impl Plan {
    pub fn task_count(&self) -> usize {
        self.queues.iter().map(ModelQueue::task_count).sum()
    }

    pub fn queue(&self, model_id: &str) -> Option<&ModelQueue> {
        self.queues.iter().find(|q| q.model.id == model_id)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Computes the work still owed per model from the result store
pub struct ResumptionPlanner<'a, R: TaskRegistry + ?Sized> {
    registry: &'a R,
    store: &'a ResultStore,
}

impl<'a, R: TaskRegistry + ?Sized> ResumptionPlanner<'a, R> {
    pub fn new(registry: &'a R, store: &'a ResultStore) -> Self {
        Self { registry, store }
    }

    /// Tasks of `benchmark` without a complete artifact for `model`,
    /// deduplicated and sorted by name.
    pub fn missing_tasks(
        &self,
        benchmark: &str,
        model: &ModelSpec,
        tasks: &[TaskDescriptor],
    ) -> Vec<TaskDescriptor> {
        let completed = self.store.completed_tasks(benchmark, model);

        let mut missing: Vec<TaskDescriptor> = tasks
            .iter()
            .filter(|t| !completed.contains(&t.name))
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.name.cmp(&b.name));
        missing.dedup_by(|a, b| a.name == b.name);
        missing
    }

    pub fn plan(&self, models: &[ModelSpec], benchmarks: &[BenchmarkSpec]) -> Plan {
        let mut plan = Plan::default();

        let mut resolved = Vec::with_capacity(benchmarks.len());
        for benchmark in benchmarks {
            match self.registry.resolve(&benchmark.name) {
                Ok(tasks) => {
                    debug!(benchmark = %benchmark.key, tasks = tasks.len(), "Resolved benchmark");
                    resolved.push((benchmark, tasks));
                }
                Err(e) => {
                    warn!(benchmark = %benchmark.key, error = %e, "Skipping benchmark for all models");
                    plan.unresolved.push(benchmark.key.clone());
                }
            }
        }

        for model in models {
            let mut items = Vec::new();
            for (benchmark, tasks) in &resolved {
                self.store.audit_revisions(&benchmark.key, model);
                let missing = self.missing_tasks(&benchmark.key, model, tasks);
                if !missing.is_empty() {
                    items.push(PendingWorkItem {
                        benchmark: (*benchmark).clone(),
                        tasks: missing,
                    });
                }
            }

            if items.is_empty() {
                debug!(model = %model.id, "All tasks complete, skipping model");
                plan.complete.push(model.clone());
            } else {
                let queue = ModelQueue {
                    model: model.clone(),
                    items,
                };
                info!(
                    model = %model.id,
                    benchmarks = queue.items.len(),
                    tasks = queue.task_count(),
                    "Pending work"
                );
                plan.queues.push(queue);
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ResultArtifact, ScoreRecord};
    use crate::registry::TaskMap;

    const MAP: &str = r#"{
        "Bench": [
            {"name": "T2", "type": "Retrieval"},
            {"name": "T1", "type": "Classification"},
            {"name": "T2", "type": "Retrieval"}
        ],
        "Other": [
            {"name": "O1", "type": "Clustering"}
        ]
    }"#;

    fn complete(store: &ResultStore, bench: &str, model: &ModelSpec, task: &str) {
        ResultArtifact::new(task, ScoreRecord::default().with_metric("main_score", 0.7))
            .write_atomic(store.artifact_path(bench, model, task))
            .unwrap();
    }

    #[test]
    fn test_missing_tasks_sorted_and_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);

        let tasks = map.resolve("Bench").unwrap();
        let model = ModelSpec::new("m", "r");
        let names: Vec<_> = planner
            .missing_tasks("bench", &model, &tasks)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["T1", "T2"]);
    }

    #[test]
    fn test_model_spans_benchmarks_in_one_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);

        let model = ModelSpec::new("org/m", "r");
        let benchmarks = vec![
            BenchmarkSpec::new("bench", "Bench"),
            BenchmarkSpec::new("other", "Other"),
        ];
        let plan = planner.plan(std::slice::from_ref(&model), &benchmarks);

        assert_eq!(plan.queues.len(), 1);
        let queue = plan.queue("org/m").unwrap();
        assert_eq!(queue.items.len(), 2);
        assert_eq!(queue.missing("bench"), vec!["T1", "T2"]);
        assert_eq!(queue.missing("other"), vec!["O1"]);
        assert_eq!(plan.task_count(), 3);
    }

    #[test]
    fn test_unknown_benchmark_does_not_abort_planning() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);

        let benchmarks = vec![
            BenchmarkSpec::new("ghost", "Ghost(v1)"),
            BenchmarkSpec::new("other", "Other"),
        ];
        let plan = planner.plan(&[ModelSpec::new("m", "r")], &benchmarks);

        assert_eq!(plan.unresolved, vec!["ghost"]);
        assert_eq!(plan.queues[0].missing("other"), vec!["O1"]);
    }

    #[test]
    fn test_complete_model_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);

        let done = ModelSpec::new("done", "r");
        complete(&store, "other", &done, "O1");

        let plan = planner.plan(
            &[done.clone(), ModelSpec::new("fresh", "r")],
            &[BenchmarkSpec::new("other", "Other")],
        );
        assert_eq!(plan.complete, vec![done]);
        assert_eq!(plan.queues.len(), 1);
        assert_eq!(plan.queues[0].model.id, "fresh");
    }

    #[test]
    fn test_planning_is_idempotent_and_monotone() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);
        let models = vec![ModelSpec::new("m", "r")];
        let benchmarks = vec![BenchmarkSpec::new("bench", "Bench")];

        let first = planner.plan(&models, &benchmarks);
        let second = planner.plan(&models, &benchmarks);
        assert_eq!(first, second);

        complete(&store, "bench", &models[0], "T2");
        let after = planner.plan(&models, &benchmarks);
        assert_eq!(after.queues[0].missing("bench"), vec!["T1"]);

        // a result for another revision does not count
        complete(&store, "bench", &ModelSpec::new("m", "other-rev"), "T1");
        let again = planner.plan(&models, &benchmarks);
        assert_eq!(again, after);
    }

    #[test]
    fn test_corrupt_artifact_is_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let map = TaskMap::from_str(MAP).unwrap();
        let planner = ResumptionPlanner::new(&map, &store);
        let model = ModelSpec::new("m", "r");

        complete(&store, "other", &model, "O1");
        std::fs::write(store.artifact_path("other", &model, "O1"), "{\"scores\": ").unwrap();

        let plan = planner.plan(&[model], &[BenchmarkSpec::new("other", "Other")]);
        assert_eq!(plan.queues[0].missing("other"), vec!["O1"]);
    }
}
