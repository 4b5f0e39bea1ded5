use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{TaskCategory, TaskDescriptor};

/// Source of benchmark definitions
pub trait TaskRegistry {
    /// Ordered task descriptors of the named benchmark
    fn resolve(&self, benchmark: &str) -> Result<Vec<TaskDescriptor>>;
}

/// Raw entry of the benchmark task map file
#[derive(Debug, Deserialize)]
struct TaskEntry {
    name: String,
    #[serde(rename = "type")]
    task_type: String,
}

/// Benchmark task map loaded from JSON:
/// `{ "<benchmark>": [{"name": "...", "type": "..."}, ...] }`
#[derive(Debug, Clone, Default)]
pub struct TaskMap {
    benchmarks: HashMap<String, Vec<TaskDescriptor>>,
}

impl TaskMap {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, Vec<TaskEntry>> = serde_json::from_str(json)?;

        let benchmarks = raw
            .into_iter()
            .map(|(benchmark, entries)| {
                let tasks = entries
                    .into_iter()
                    .filter_map(|entry| match entry.task_type.parse::<TaskCategory>() {
                        Ok(category) => Some(TaskDescriptor {
                            name: entry.name,
                            category,
                            benchmark: benchmark.clone(),
                        }),
                        Err(_) => {
                            warn!(
                                benchmark = %benchmark,
                                task = %entry.name,
                                task_type = %entry.task_type,
                                "Skipping task with unsupported type"
                            );
                            None
                        }
                    })
                    .collect();
                (benchmark, tasks)
            })
            .collect();

        Ok(Self { benchmarks })
    }

    pub fn contains(&self, benchmark: &str) -> bool {
        self.benchmarks.contains_key(benchmark)
    }

    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// Task names of `benchmark` grouped by the requested categories.
    ///
    /// Groups follow the order of `categories`; names keep map order.
    pub fn tasks_by_category(
        &self,
        benchmark: &str,
        categories: &[TaskCategory],
    ) -> Result<Vec<(TaskCategory, Vec<String>)>> {
        let tasks = self.resolve(benchmark)?;
        Ok(group_by_category(&tasks, categories))
    }
}

/// Task names grouped by `categories`, in category order
pub fn group_by_category(
    tasks: &[TaskDescriptor],
    categories: &[TaskCategory],
) -> Vec<(TaskCategory, Vec<String>)> {
    categories
        .iter()
        .map(|category| {
            let names = tasks
                .iter()
                .filter(|t| t.category == *category)
                .map(|t| t.name.clone())
                .collect();
            (*category, names)
        })
        .collect()
}

impl TaskRegistry for TaskMap {
    fn resolve(&self, benchmark: &str) -> Result<Vec<TaskDescriptor>> {
        self.benchmarks
            .get(benchmark)
            .cloned()
            .ok_or_else(|| Error::UnknownBenchmark(benchmark.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: &str = r#"{
        "ChemTEB": [
            {"name": "WikipediaEasy10Classification", "type": "Classification"},
            {"name": "CoconutSMILES2FormulaPC", "type": "PairClassification"},
            {"name": "WikipediaRerankingMultilingual", "type": "Reranking", "domains": ["Chemistry"]},
            {"name": "ChemNQRetrieval", "type": "Retrieval"},
            {"name": "PubChemSMILESBitextMining", "type": "BitextMining"},
            {"name": "WikipediaMedium5Clustering", "type": "Clustering"},
            {"name": "SDSEyeProtectionClassification", "type": "Classification"}
        ]
    }"#;

    #[test]
    fn test_resolve_keeps_order_and_skips_unknown_types() {
        let map = TaskMap::from_str(MAP).unwrap();
        let tasks = map.resolve("ChemTEB").unwrap();
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0].name, "WikipediaEasy10Classification");
        assert_eq!(tasks[0].benchmark, "ChemTEB");
        assert!(tasks.iter().all(|t| t.name != "PubChemSMILESBitextMining"));
    }

    #[test]
    fn test_unknown_benchmark() {
        let map = TaskMap::from_str(MAP).unwrap();
        assert!(matches!(
            map.resolve("MTEB(eng, v2)"),
            Err(Error::UnknownBenchmark(name)) if name == "MTEB(eng, v2)"
        ));
    }

    #[test]
    fn test_tasks_by_category() {
        let map = TaskMap::from_str(MAP).unwrap();
        let groups = map
            .tasks_by_category(
                "ChemTEB",
                &[
                    TaskCategory::Classification,
                    TaskCategory::Clustering,
                    TaskCategory::Sts,
                ],
            )
            .unwrap();

        assert_eq!(groups[0].0, TaskCategory::Classification);
        assert_eq!(
            groups[0].1,
            vec!["WikipediaEasy10Classification", "SDSEyeProtectionClassification"]
        );
        assert_eq!(groups[1].1, vec!["WikipediaMedium5Clustering"]);
        assert!(groups[2].1.is_empty());
    }
}
