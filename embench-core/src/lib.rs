pub mod artifact;
pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
pub mod planner;
pub mod registry;
pub mod report;
pub mod runner;
pub mod status;
pub mod store;
pub mod types;

// re-exports
pub use artifact::{ModelMeta, ResultArtifact, ScoreRecord};
pub use backend::{EvaluationJob, LoadRequest, LoadedModel, ModelBackend};
pub use config::{BackendConfig, Config, ModelOptions, load_models};
pub use error::{Error, Result};
pub use planner::{ModelQueue, PendingWorkItem, Plan, ResumptionPlanner};
pub use registry::{TaskMap, TaskRegistry};
pub use report::{ReportConfig, ReportContext, ScoreCollector};
pub use runner::{EvaluationRunner, ProgressEvent, RunSummary, RunnerConfig};
pub use status::{ModelStatus, completion_status};
pub use store::ResultStore;
pub use types::{BenchmarkSpec, ModelSpec, TaskCategory, TaskDescriptor};
