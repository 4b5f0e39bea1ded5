use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::TaskRegistry;
use crate::store::ResultStore;
use crate::types::{BenchmarkSpec, ModelSpec};

/// Completion of one benchmark for one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkStatus {
    pub benchmark: String,
    pub completed: usize,
    pub total: usize,
}

impl BenchmarkStatus {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model: ModelSpec,
    pub benchmarks: Vec<BenchmarkStatus>,
}

impl ModelStatus {
    pub fn is_complete(&self) -> bool {
        self.benchmarks.iter().all(BenchmarkStatus::is_complete)
    }
}

/// Count complete artifacts per model and benchmark.
///
/// Benchmarks that cannot be resolved are logged and left out.
pub fn completion_status<R: TaskRegistry + ?Sized>(
    models: &[ModelSpec],
    benchmarks: &[BenchmarkSpec],
    registry: &R,
    store: &ResultStore,
) -> Vec<ModelStatus> {
    let resolved: Vec<(&BenchmarkSpec, BTreeSet<String>)> = benchmarks
        .iter()
        .filter_map(|benchmark| match registry.resolve(&benchmark.name) {
            Ok(tasks) => Some((benchmark, tasks.into_iter().map(|t| t.name).collect())),
            Err(e) => {
                warn!(benchmark = %benchmark.key, error = %e, "Benchmark left out of status");
                None
            }
        })
        .collect();

    models
        .iter()
        .map(|model| ModelStatus {
            model: model.clone(),
            benchmarks: resolved
                .iter()
                .map(|(benchmark, tasks)| {
                    let done = store.completed_tasks(&benchmark.key, model);
                    BenchmarkStatus {
                        benchmark: benchmark.key.clone(),
                        completed: tasks.intersection(&done).count(),
                        total: tasks.len(),
                    }
                })
                .collect(),
        })
        .collect()
}
