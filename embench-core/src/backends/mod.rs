pub mod worker;

pub use worker::WorkerBackend;

use crate::backend::ModelBackend;
use crate::config::BackendConfig;
use crate::error::Result;

/// Build the backend selected in the configuration
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn ModelBackend>> {
    match config {
        BackendConfig::Worker(worker) => Ok(Box::new(WorkerBackend::new(worker.clone())?)),
    }
}
