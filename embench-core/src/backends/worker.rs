use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::backend::{EvaluationJob, LoadRequest, LoadedModel, ModelBackend};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::types::ModelSpec;

/// Request line sent to the worker
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WorkerRequest<'a> {
    Load(&'a LoadRequest),
    Evaluate(&'a EvaluationJob),
    Reclaim,
    Unload,
}

/// Response line read back from the worker
#[derive(Debug, Deserialize)]
struct WorkerResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Backend delegating to an external process, one process per loaded model.
///
/// The process reads one JSON request per line on stdin and answers each
/// with one JSON line `{"ok": bool, "error": "..."}` on stdout. Other
/// stdout lines are logged and ignored; stderr is inherited.
pub struct WorkerBackend {
    config: WorkerConfig,
}

impl WorkerBackend {
    pub fn new(config: WorkerConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(Error::Config("Worker command must not be empty".into()));
        }
        Ok(Self { config })
    }
}

#[async_trait]
impl ModelBackend for WorkerBackend {
    fn name(&self) -> &str {
        &self.config.command[0]
    }

    async fn load(&self, request: &LoadRequest) -> Result<Box<dyn LoadedModel>> {
        let process = WorkerProcess::start_loaded(&self.config, request).await?;
        Ok(Box::new(WorkerModel {
            config: self.config.clone(),
            request: request.clone(),
            process: Some(process),
        }))
    }
}

struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    /// Set once the pipe broke, the worker exited or a call timed out
    broken: bool,
}

impl WorkerProcess {
    fn spawn(config: &WorkerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command[0]);
        cmd.args(&config.command[1..]);
        cmd.envs(&config.env);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::Worker(format!("Failed to spawn {}: {}", config.command[0], e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Worker("Worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Worker("Worker stdout unavailable".into()))?;

        debug!(pid = ?child.id(), "Spawned worker process");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            broken: false,
        })
    }

    /// Spawn a fresh process and load the requested model into it
    async fn start_loaded(config: &WorkerConfig, request: &LoadRequest) -> Result<Self> {
        let mut process = Self::spawn(config)?;
        let timeout = config.load_timeout_secs.map(Duration::from_secs);

        if let Err(e) = process.call(&WorkerRequest::Load(request), timeout).await {
            process.kill().await;
            return Err(Error::ModelLoad {
                model: request.model.id.clone(),
                reason: e.to_string(),
            });
        }
        Ok(process)
    }

    fn is_alive(&mut self) -> bool {
        !self.broken && matches!(self.child.try_wait(), Ok(None))
    }

    async fn call(&mut self, request: &WorkerRequest<'_>, timeout: Option<Duration>) -> Result<()> {
        let response = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.exchange(request)).await {
                Ok(response) => response,
                Err(_) => {
                    self.broken = true;
                    self.kill().await;
                    return Err(Error::Timeout(limit.as_millis() as u64));
                }
            },
            None => self.exchange(request).await,
        };

        let response = response.inspect_err(|_| self.broken = true)?;
        if response.ok {
            Ok(())
        } else {
            Err(Error::Worker(
                response
                    .error
                    .unwrap_or_else(|| "worker reported failure without message".into()),
            ))
        }
    }

    async fn exchange(&mut self, request: &WorkerRequest<'_>) -> Result<WorkerResponse> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Worker(format!("Failed to write request: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::Worker(format!("Failed to write request: {e}")))?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(Error::Worker("worker exited before responding".into()));
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WorkerResponse>(line) {
                Ok(response) => return Ok(response),
                Err(_) => debug!(output = line, "Worker output"),
            }
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(error = %e, "Killing worker process failed");
        }
    }

    /// Close stdin and wait for exit, killing the process after `grace`
    async fn shutdown(self, grace: Duration) {
        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);

        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "Worker process exited"),
            Ok(Err(e)) => warn!(error = %e, "Waiting for worker process failed"),
            Err(_) => {
                warn!(grace_s = grace.as_secs(), "Worker did not exit, killing it");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Killing worker process failed");
                }
            }
        }
    }
}

/// A model held by a running worker process
struct WorkerModel {
    config: WorkerConfig,
    request: LoadRequest,
    process: Option<WorkerProcess>,
}

impl WorkerModel {
    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.shutdown_timeout_secs)
    }

    /// Live worker process, restarting it and reloading the model if the
    /// previous one died
    async fn ensure_process(&mut self) -> Result<&mut WorkerProcess> {
        let alive = match self.process.as_mut() {
            Some(process) => process.is_alive(),
            None => false,
        };

        if !alive {
            if let Some(dead) = self.process.take() {
                dead.shutdown(Duration::from_secs(1)).await;
            }
            info!(model = %self.request.model, "Restarting worker and reloading model");
            self.process = Some(WorkerProcess::start_loaded(&self.config, &self.request).await?);
        }

        self.process
            .as_mut()
            .ok_or_else(|| Error::Worker("worker process unavailable".into()))
    }
}

#[async_trait]
impl LoadedModel for WorkerModel {
    fn spec(&self) -> &ModelSpec {
        &self.request.model
    }

    async fn evaluate(&mut self, job: &EvaluationJob) -> Result<()> {
        let timeout = self.config.task_timeout_secs.map(Duration::from_secs);
        let process = self.ensure_process().await?;
        process
            .call(&WorkerRequest::Evaluate(job), timeout)
            .await
            .map_err(|e| Error::Evaluation(format!("{}: {}", job.task.name, e)))
    }

    async fn reclaim(&mut self) -> Result<()> {
        let grace = self.grace();
        let Some(process) = self.process.as_mut() else {
            return Ok(());
        };
        // a dead worker is replaced on the next task anyway
        if !process.is_alive() {
            return Ok(());
        }
        process.call(&WorkerRequest::Reclaim, Some(grace)).await
    }

    async fn unload(self: Box<Self>) -> Result<()> {
        let grace = self.grace();
        let model = *self;
        let Some(mut process) = model.process else {
            return Ok(());
        };

        let result = if process.is_alive() {
            process.call(&WorkerRequest::Unload, Some(grace)).await
        } else {
            Ok(())
        };
        process.shutdown(grace).await;
        result
    }
}
