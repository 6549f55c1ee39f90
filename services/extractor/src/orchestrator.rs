//! Extraction job orchestration.
//!
//! Each submitted job runs on its own Tokio task through the stages
//! submit, poll, download, decode and process. Only that task writes the
//! job's state (through a `watch` channel); callers read snapshots, wait for
//! the outcome or request cancellation.
//!
//! Cancellation is observed before submission, at every poll, before the
//! download and before processing. Provider calls already in flight run to
//! completion, so an accepted remote job always has a handle to release.
//! Once processing starts the job runs to completion or failure. The host
//! observer hears about termination exactly once.
//!
//! A finished job stays in the table until its outcome is collected with
//! [`Orchestrator::wait`] or dropped with [`Orchestrator::forget`].

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use era5_common::{ErrorKind, ExtractionError, ExtractionResult, GriddedArray, VariableSpec};
use grid_processor::ProcessingConfig;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{ExtractorConfig, PollConfig, RetryConfig};
use crate::job::{ExtractionOutput, JobId, JobOutcome, JobSnapshot, JobState, ScopedFile};
use crate::process;
use crate::provider::{ClimateDataProvider, ProviderJobHandle, ProviderStatus};
use crate::request::RequestDescriptor;

/// Turns a downloaded file into one array per requested variable.
pub trait GridDecoder: Send + Sync {
    fn decode(&self, path: &Path, variables: &[VariableSpec]) -> ExtractionResult<Vec<GriddedArray>>;
}

/// NetCDF decoder backed by libnetcdf.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct NetCdfDecoder;

#[cfg(feature = "native")]
impl GridDecoder for NetCdfDecoder {
    fn decode(&self, path: &Path, variables: &[VariableSpec]) -> ExtractionResult<Vec<GriddedArray>> {
        Ok(netcdf_parser::decode_file(path, variables)?)
    }
}

/// Host callbacks. Called from the job's task.
pub trait JobObserver: Send + Sync {
    fn on_progress(&self, _job_id: JobId, _state: JobState) {}

    fn on_completed(&self, job_id: JobId, result: Arc<ExtractionOutput>);

    fn on_failed(&self, job_id: JobId, kind: ErrorKind, message: &str);

    fn on_cancelled(&self, job_id: JobId);
}

/// Observer that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl JobObserver for LoggingObserver {
    fn on_progress(&self, job_id: JobId, state: JobState) {
        info!(job_id = %job_id, state = %state, "Job progress");
    }

    fn on_completed(&self, job_id: JobId, _result: Arc<ExtractionOutput>) {
        info!(job_id = %job_id, "Job completed");
    }

    fn on_failed(&self, job_id: JobId, kind: ErrorKind, message: &str) {
        error!(job_id = %job_id, kind = %kind, error = %message, "Job failed");
    }

    fn on_cancelled(&self, job_id: JobId) {
        warn!(job_id = %job_id, "Job cancelled");
    }
}

/// Settings a job task needs, detached from the full config.
#[derive(Debug, Clone)]
struct JobSettings {
    dataset: String,
    work_dir: PathBuf,
    retry: RetryConfig,
    poll: PollConfig,
    processing: ProcessingConfig,
}

struct JobEntry {
    state: watch::Receiver<JobSnapshot>,
    cancel: CancellationToken,
}

/// Why a job stopped early.
enum Interrupt {
    Cancelled,
    Failed(ExtractionError),
}

impl From<ExtractionError> for Interrupt {
    fn from(err: ExtractionError) -> Self {
        Self::Failed(err)
    }
}

/// Shared per-job context.
#[derive(Clone)]
struct JobContext {
    id: JobId,
    provider: Arc<dyn ClimateDataProvider>,
    decoder: Arc<dyn GridDecoder>,
    observer: Arc<dyn JobObserver>,
    settings: Arc<JobSettings>,
    state: Arc<watch::Sender<JobSnapshot>>,
    cancel: CancellationToken,
}

impl JobContext {
    fn transition(&self, state: JobState) {
        let previous = self.state.send_replace(JobSnapshot {
            state,
            outcome: None,
        });
        if previous.state != state {
            debug!(job_id = %self.id, from = %previous.state, to = %state, "State transition");
            self.observer.on_progress(self.id, state);
        }
    }

    fn checkpoint(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            Err(Interrupt::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Sleep unless cancelled first.
    async fn pause(&self, delay: Duration) -> Result<(), Interrupt> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
        }
    }

    /// Run `op`, retrying retryable errors with exponential backoff. `op`
    /// itself is never interrupted; cancellation is seen between attempts.
    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Interrupt>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ExtractionResult<T>>,
    {
        let retry = &self.settings.retry;
        let mut attempt = 0u32;
        let mut delay = retry.initial_delay();

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    warn!(
                        job_id = %self.id,
                        operation = what,
                        error = %e,
                        retry = attempt,
                        max_retries = retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    self.pause(delay).await?;
                    delay = std::cmp::min(delay * 2, retry.max_delay());
                }
                Err(e) => return Err(Interrupt::Failed(e)),
            }
        }
    }
}

/// Runs extraction jobs in the background.
pub struct Orchestrator {
    provider: Arc<dyn ClimateDataProvider>,
    decoder: Arc<dyn GridDecoder>,
    observer: Arc<dyn JobObserver>,
    settings: Arc<JobSettings>,
    jobs: Mutex<HashMap<JobId, JobEntry>>,
}

impl Orchestrator {
    pub fn new(
        config: &ExtractorConfig,
        provider: Arc<dyn ClimateDataProvider>,
        decoder: Arc<dyn GridDecoder>,
        observer: Arc<dyn JobObserver>,
    ) -> Self {
        let settings = JobSettings {
            dataset: config.provider.dataset.clone(),
            work_dir: config.resolved_work_dir(),
            retry: config.retry.clone(),
            poll: config.poll.clone(),
            processing: config.processing.clone(),
        };
        Self {
            provider,
            decoder,
            observer,
            settings: Arc::new(settings),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Start a job for a validated request. Must be called inside a Tokio
    /// runtime.
    pub fn submit(&self, descriptor: RequestDescriptor) -> JobId {
        let id = JobId::new();
        let (tx, rx) = watch::channel(JobSnapshot::queued());
        let cancel = CancellationToken::new();

        let ctx = JobContext {
            id,
            provider: self.provider.clone(),
            decoder: self.decoder.clone(),
            observer: self.observer.clone(),
            settings: self.settings.clone(),
            state: Arc::new(tx),
            cancel: cancel.clone(),
        };

        self.lock_jobs().insert(id, JobEntry { state: rx, cancel });
        info!(job_id = %id, variables = descriptor.variables.len(), "Job queued");
        tokio::spawn(run_job(ctx, descriptor));
        id
    }

    /// Request cancellation. Returns `false` for unknown or finished jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let jobs = self.lock_jobs();
        match jobs.get(&id) {
            Some(entry) if !entry.state.borrow().state.is_terminal() => {
                info!(job_id = %id, "Cancellation requested");
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, id: JobId) -> Option<JobState> {
        self.lock_jobs().get(&id).map(|e| e.state.borrow().state)
    }

    /// Wait for the job to terminate and collect its outcome. The job is
    /// forgotten afterwards; later calls for the same id return `None`.
    pub async fn wait(&self, id: JobId) -> Option<JobOutcome> {
        let mut rx = self.lock_jobs().get(&id).map(|e| e.state.clone())?;
        let outcome = {
            let snapshot = rx.wait_for(|s| s.outcome.is_some()).await.ok()?;
            snapshot.outcome.clone()
        };
        self.forget(id);
        outcome
    }

    /// Drop a finished job from the table, returning its outcome. Jobs that
    /// are still running are kept and `None` is returned.
    pub fn forget(&self, id: JobId) -> Option<JobOutcome> {
        let mut jobs = self.lock_jobs();
        let outcome = jobs.get(&id)?.state.borrow().outcome.clone()?;
        jobs.remove(&id);
        debug!(job_id = %id, "Job forgotten");
        Some(outcome)
    }

    /// Jobs not yet in a terminal state.
    pub fn active(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .lock_jobs()
            .iter()
            .filter(|(_, e)| !e.state.borrow().state.is_terminal())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[instrument(skip_all, fields(job_id = %ctx.id))]
async fn run_job(ctx: JobContext, descriptor: RequestDescriptor) {
    let mut handle = None;
    let outcome = match execute(&ctx, &descriptor, &mut handle).await {
        Ok(output) => JobOutcome::Completed(Arc::new(output)),
        Err(Interrupt::Cancelled) => JobOutcome::Cancelled,
        Err(Interrupt::Failed(e)) => JobOutcome::Failed {
            kind: e.kind(),
            message: e.to_string(),
        },
    };

    if !matches!(outcome, JobOutcome::Completed(_)) {
        if let Some(handle) = handle {
            if let Err(e) = ctx.provider.release(&handle).await {
                warn!(provider_job = %handle, error = %e, "Failed to release provider job");
            }
        }
    }

    ctx.state.send_replace(JobSnapshot {
        state: outcome.state(),
        outcome: Some(outcome.clone()),
    });
    match outcome {
        JobOutcome::Completed(output) => ctx.observer.on_completed(ctx.id, output),
        JobOutcome::Failed { kind, message } => ctx.observer.on_failed(ctx.id, kind, &message),
        JobOutcome::Cancelled => ctx.observer.on_cancelled(ctx.id),
    }
}

async fn execute(
    ctx: &JobContext,
    descriptor: &RequestDescriptor,
    handle_slot: &mut Option<ProviderJobHandle>,
) -> Result<ExtractionOutput, Interrupt> {
    let settings = &ctx.settings;

    ctx.checkpoint()?;
    let request = descriptor.to_provider_request(&settings.dataset, &settings.processing);
    let handle = ctx
        .with_retry("submit", || ctx.provider.submit(&request))
        .await?;
    *handle_slot = Some(handle.clone());
    ctx.transition(JobState::Submitted);

    wait_until_ready(ctx, &handle).await?;

    ctx.checkpoint()?;
    ctx.transition(JobState::Downloading);
    tokio::fs::create_dir_all(&settings.work_dir)
        .await
        .map_err(ExtractionError::from)?;
    let file = ScopedFile::new(settings.work_dir.join(format!("{}.nc", ctx.id)));
    let bytes = ctx
        .with_retry("download", || ctx.provider.fetch(&handle, file.path()))
        .await?;
    info!(bytes, path = %file.path().display(), "Result downloaded");

    ctx.checkpoint()?;
    ctx.transition(JobState::Processing);
    let decoder = ctx.decoder.clone();
    let processing = settings.processing.clone();
    let descriptor = descriptor.clone();
    let output = tokio::task::spawn_blocking(move || {
        let arrays = decoder.decode(file.path(), &descriptor.variables)?;
        let output = process::extract(arrays, &descriptor, &processing);
        drop(file);
        output
    })
    .await
    .map_err(|e| ExtractionError::Processing(format!("processing task failed: {}", e)))??;

    Ok(output)
}

async fn wait_until_ready(ctx: &JobContext, handle: &ProviderJobHandle) -> Result<(), Interrupt> {
    let poll = &ctx.settings.poll;
    let deadline = Instant::now() + poll.max_wait();
    let mut interval = poll.initial_interval();

    loop {
        ctx.checkpoint()?;
        ctx.transition(JobState::Polling);

        match ctx.with_retry("status", || ctx.provider.status(handle)).await? {
            ProviderStatus::Ready => return Ok(()),
            ProviderStatus::Failed(message) => {
                return Err(ExtractionError::Provider(message).into());
            }
            ProviderStatus::Accepted | ProviderStatus::Running => {}
        }

        if Instant::now() + interval > deadline {
            return Err(ExtractionError::Provider(format!(
                "job {} not ready after {}s",
                handle,
                poll.max_wait().as_secs()
            ))
            .into());
        }
        ctx.pause(interval).await?;
        interval = std::cmp::min(interval * 2, poll.max_interval());
    }
}
