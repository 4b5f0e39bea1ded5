use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::artifact::{MODEL_META_FILE, ModelMeta, RESULT_EXTENSION, ResultArtifact};
use crate::types::{ModelSpec, model_dir_name};

/// Read-only view over the on-disk result tree:
/// `<root>/<benchmark>/results/<model_dir>/<revision>/<task>.json`
#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding every model of a benchmark
    pub fn benchmark_dir(&self, benchmark: &str) -> PathBuf {
        self.root.join(benchmark).join("results")
    }

    /// Directory of one model; `model_dir` is already filesystem-safe
    pub fn model_dir(&self, benchmark: &str, model_dir: &str) -> PathBuf {
        self.benchmark_dir(benchmark).join(model_dir)
    }

    pub fn revision_dir(&self, benchmark: &str, model_dir: &str, revision: &str) -> PathBuf {
        self.model_dir(benchmark, model_dir).join(revision)
    }

    /// Revision directory for a model identifier (slashes mapped)
    pub fn revision_dir_for(&self, benchmark: &str, model: &ModelSpec) -> PathBuf {
        self.revision_dir(benchmark, &model_dir_name(&model.id), &model.revision)
    }

    pub fn artifact_path(&self, benchmark: &str, model: &ModelSpec, task: &str) -> PathBuf {
        self.revision_dir_for(benchmark, model)
            .join(format!("{task}.{RESULT_EXTENSION}"))
    }

    pub fn model_meta_path(&self, benchmark: &str, model_dir: &str, revision: &str) -> PathBuf {
        self.revision_dir(benchmark, model_dir, revision)
            .join(MODEL_META_FILE)
    }

    /// Tasks of `model` with a complete artifact under `benchmark`.
    ///
    /// A missing directory and an empty one both yield an empty set. Files
    /// that fail to parse or lack the evaluation split are left out so the
    /// task runs again.
    pub fn completed_tasks(&self, benchmark: &str, model: &ModelSpec) -> BTreeSet<String> {
        self.completed_tasks_in(benchmark, &model.dir_name(), &model.revision)
    }

    pub fn completed_tasks_in(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: &str,
    ) -> BTreeSet<String> {
        let dir = self.revision_dir(benchmark, model_dir, revision);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "No results directory");
                return BTreeSet::new();
            }
        };

        let mut completed = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.file_name().is_some_and(|n| n == MODEL_META_FILE) {
                continue;
            }
            if path.extension().is_none_or(|ext| ext != RESULT_EXTENSION) {
                continue;
            }
            let Some(task) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match ResultArtifact::from_file(&path) {
                Ok(artifact) if artifact.is_complete() => {
                    completed.insert(task.to_string());
                }
                Ok(_) => debug!(path = %path.display(), "Artifact has no evaluation scores"),
                Err(e) => debug!(path = %path.display(), error = %e, "Unreadable artifact"),
            }
        }
        completed
    }

    /// Complete artifact for a task, `None` when absent or invalid
    pub fn load_artifact(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: &str,
        task: &str,
    ) -> Option<ResultArtifact> {
        let path = self
            .revision_dir(benchmark, model_dir, revision)
            .join(format!("{task}.{RESULT_EXTENSION}"));
        ResultArtifact::load_complete(path)
    }

    pub fn load_model_meta(
        &self,
        benchmark: &str,
        model_dir: &str,
        revision: &str,
    ) -> Option<ModelMeta> {
        ModelMeta::from_file(self.model_meta_path(benchmark, model_dir, revision)).ok()
    }

    /// Revision directories present for a model, sorted
    pub fn revisions(&self, benchmark: &str, model_dir: &str) -> Vec<String> {
        subdirectories(&self.model_dir(benchmark, model_dir))
    }

    /// Model directories present under a benchmark, sorted
    pub fn model_dirs(&self, benchmark: &str) -> Vec<String> {
        subdirectories(&self.benchmark_dir(benchmark))
    }

    /// Pick the revision to read for a model.
    ///
    /// A declared revision always wins. Otherwise exactly one revision
    /// directory must exist; several are a configuration anomaly and
    /// resolve to nothing rather than to whichever is listed first.
    pub fn resolve_revision(
        &self,
        benchmark: &str,
        model_dir: &str,
        declared: Option<&str>,
    ) -> Option<String> {
        if let Some(revision) = declared {
            return Some(revision.to_string());
        }

        let mut revisions = self.revisions(benchmark, model_dir);
        match revisions.len() {
            0 => None,
            1 => revisions.pop(),
            _ => {
                warn!(
                    benchmark,
                    model = model_dir,
                    revisions = ?revisions,
                    "Multiple revision directories and no declared revision, ignoring model"
                );
                None
            }
        }
    }

    /// Log revision directories that do not match the declared revision
    pub fn audit_revisions(&self, benchmark: &str, model: &ModelSpec) {
        let stray: Vec<String> = self
            .revisions(benchmark, &model.dir_name())
            .into_iter()
            .filter(|r| r != &model.revision)
            .collect();

        if !stray.is_empty() {
            warn!(
                benchmark,
                model = %model.id,
                declared = %model.revision,
                other_revisions = ?stray,
                "Results exist for undeclared revisions"
            );
        }
    }
}

fn subdirectories(path: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ScoreRecord;

    fn write_result(store: &ResultStore, bench: &str, model: &ModelSpec, task: &str) {
        ResultArtifact::new(task, ScoreRecord::default().with_metric("main_score", 0.5))
            .write_atomic(store.artifact_path(bench, model, task))
            .unwrap();
    }

    #[test]
    fn test_paths_flatten_model_namespace() {
        let store = ResultStore::new("/results");
        let model = ModelSpec::new("org/name", "rev1");
        assert_eq!(
            store.artifact_path("mteb", &model, "T1"),
            PathBuf::from("/results/mteb/results/org__name/rev1/T1.json")
        );
    }

    #[test]
    fn test_completed_tasks_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let model = ModelSpec::new("org/name", "rev1");
        assert!(store.completed_tasks("mteb", &model).is_empty());

        std::fs::create_dir_all(store.revision_dir_for("mteb", &model)).unwrap();
        assert!(store.completed_tasks("mteb", &model).is_empty());
    }

    #[test]
    fn test_completed_tasks_filters_invalid_and_reserved_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let model = ModelSpec::new("org/name", "rev1");
        write_result(&store, "mteb", &model, "T1");

        let rev_dir = store.revision_dir_for("mteb", &model);
        std::fs::write(rev_dir.join("T2.json"), "{ truncated").unwrap();
        std::fs::write(rev_dir.join("T3.json"), r#"{"scores": {"test": []}}"#).unwrap();
        std::fs::write(rev_dir.join("T4.txt"), "not a result").unwrap();
        std::fs::write(rev_dir.join("T5.json.tmp"), "{}").unwrap();
        std::fs::write(
            rev_dir.join(MODEL_META_FILE),
            r#"{"embed_dim": 768, "n_parameters": 100}"#,
        )
        .unwrap();
        std::fs::create_dir_all(rev_dir.join("T6.json")).unwrap();

        let completed = store.completed_tasks("mteb", &model);
        assert_eq!(completed.into_iter().collect::<Vec<_>>(), vec!["T1"]);

        // slashes never create a nested tree
        assert!(!dir.path().join("mteb/results/org/name").exists());
    }

    #[test]
    fn test_load_artifact_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());
        let model = ModelSpec::new("org/name", "rev1");
        write_result(&store, "chemteb", &model, "T1");
        std::fs::write(
            store.revision_dir_for("chemteb", &model).join(MODEL_META_FILE),
            r#"{"embed_dim": 768}"#,
        )
        .unwrap();

        let artifact = store.load_artifact("chemteb", "org__name", "rev1", "T1").unwrap();
        assert_eq!(artifact.metric("main_score"), Some(0.5));
        assert!(store.load_artifact("chemteb", "org__name", "rev1", "T9").is_none());

        let meta = store.load_model_meta("chemteb", "org__name", "rev1").unwrap();
        assert_eq!(meta.embedding_size(), Some(768));
    }

    #[test]
    fn test_resolve_revision() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path());

        assert_eq!(store.resolve_revision("mteb", "org__name", None), None);

        write_result(&store, "mteb", &ModelSpec::new("org/name", "aaa"), "T1");
        assert_eq!(
            store.resolve_revision("mteb", "org__name", None).as_deref(),
            Some("aaa")
        );

        write_result(&store, "mteb", &ModelSpec::new("org/name", "bbb"), "T1");
        assert_eq!(store.resolve_revision("mteb", "org__name", None), None);
        assert_eq!(
            store.resolve_revision("mteb", "org__name", Some("bbb")).as_deref(),
            Some("bbb")
        );
        assert_eq!(store.revisions("mteb", "org__name"), vec!["aaa", "bbb"]);
        assert_eq!(store.model_dirs("mteb"), vec!["org__name"]);
        assert!(store.model_dirs("missing").is_empty());
    }
}
