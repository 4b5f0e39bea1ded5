use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Process-wide logging: console on stderr, plus a debug-level run log
/// file when a log directory is configured.
pub struct LogContext {
    file: Option<Arc<File>>,
    path: Option<PathBuf>,
}

impl LogContext {
    pub fn init(log_dir: Option<&Path>) -> Result<Self> {
        let (file, path) = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("creating log directory {}", dir.display()))?;
                let path = dir.join(format!(
                    "embench_{}.log",
                    Local::now().format("%y%m%d_%H%M%S")
                ));
                let file = File::create(&path)
                    .with_context(|| format!("creating log file {}", path.display()))?;
                (Some(Arc::new(file)), Some(path))
            }
            None => (None, None),
        };

        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            );
        let file_layer = file.as_ref().map(|file| {
            fmt::layer()
                .with_writer(file.clone())
                .with_ansi(false)
                .with_filter(LevelFilter::DEBUG)
        });

        tracing_subscriber::registry()
            .with(console)
            .with(file_layer)
            .try_init()
            .context("installing tracing subscriber")?;

        Ok(Self { file, path })
    }

    /// Run log file, if one is being written
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush the run log to disk
    pub fn shutdown(self) -> Result<()> {
        if let Some(file) = self.file {
            file.sync_all().context("syncing log file")?;
        }
        Ok(())
    }
}
