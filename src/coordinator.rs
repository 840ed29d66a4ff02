//! The upload/poll state machine exposed to callers.
//!
//! One `UploadCoordinator` tracks at most one job. Every upload attempt gets a
//! new generation number and cancellation token; results from an older
//! generation are dropped instead of being applied to the current snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    error::JobFailure,
    jobs::{AudioFile, JobSnapshot, JobStatus},
    poller::{self, PollOutcome, PollPolicy},
    transport::Transport,
};

/// Owns the tracked job and drives submit → poll for it.
pub struct UploadCoordinator {
    transport: Arc<dyn Transport>,
    policy: PollPolicy,
    shared: Arc<Shared>,
}

/// State touched by both the caller and the running attempt.
struct Shared {
    inner: Mutex<Inner>,
    state: watch::Sender<JobSnapshot>,
}

struct Inner {
    file: Option<AudioFile>,
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the snapshot only while `generation` is still current.
    fn apply(&self, generation: u64, f: impl FnOnce(&mut JobSnapshot)) -> bool {
        let inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(
                "dropping update from attempt {generation} (current {})",
                inner.generation
            );
            return false;
        }
        self.state.send_modify(f);
        true
    }

    /// Abandon whatever is running and return to `Idle` with `file` selected.
    fn reset(&self, file: Option<AudioFile>) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        inner.file = file;
        self.state.send_replace(JobSnapshot::default());
    }
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn Transport>, policy: PollPolicy) -> Self {
        let (state, _) = watch::channel(JobSnapshot::default());
        Self {
            transport,
            policy,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    file: None,
                    generation: 0,
                    cancel: None,
                }),
                state,
            }),
        }
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<JobSnapshot> {
        self.shared.state.subscribe()
    }

    pub fn selected_file(&self) -> Option<AudioFile> {
        self.shared.lock().file.clone()
    }

    /// Select a new file; discards any job in flight.
    pub fn select_file(&self, file: AudioFile) {
        tracing::info!("file selected: {}", file.filename);
        self.shared.reset(Some(file));
    }

    /// Drop the selection; discards any job in flight.
    pub fn clear_file(&self) {
        tracing::info!("file cleared");
        self.shared.reset(None);
    }

    /// Start uploading the selected file.
    ///
    /// Returns `false` (and changes nothing) when no file is selected or a job
    /// is already uploading/processing, or when called outside a tokio runtime.
    pub fn start_upload(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("start_upload ignored: no tokio runtime");
            return false;
        };

        let (generation, file, cancel) = {
            let mut inner = self.shared.lock();
            let busy = self.shared.state.borrow().status.is_busy();
            if busy {
                tracing::debug!("start_upload ignored: job already in flight");
                return false;
            }
            let Some(file) = inner.file.clone() else {
                tracing::debug!("start_upload ignored: no file selected");
                return false;
            };

            inner.generation += 1;
            let cancel = CancellationToken::new();
            if let Some(old) = inner.cancel.replace(cancel.clone()) {
                old.cancel();
            }
            self.shared
                .state
                .send_replace(JobSnapshot::uploading(&file.filename));
            (inner.generation, file, cancel)
        };

        tracing::info!("upload attempt {generation} started: {}", file.filename);
        runtime.spawn(run_attempt(
            self.transport.clone(),
            self.policy.clone(),
            self.shared.clone(),
            generation,
            file,
            cancel,
        ));
        true
    }

    /// Wait until no job is in flight and return the resulting state.
    pub async fn settled(&self) -> JobSnapshot {
        let mut rx = self.subscribe();
        match rx.wait_for(|s| !s.status.is_busy()).await {
            Ok(s) => s.clone(),
            Err(_) => self.snapshot(),
        }
    }
}

impl Drop for UploadCoordinator {
    fn drop(&mut self) {
        if let Some(cancel) = self.shared.lock().cancel.take() {
            cancel.cancel();
        }
    }
}

/// One upload attempt: submit, then poll until terminal or cancelled.
async fn run_attempt(
    transport: Arc<dyn Transport>,
    policy: PollPolicy,
    shared: Arc<Shared>,
    generation: u64,
    file: AudioFile,
    cancel: CancellationToken,
) {
    let submitted = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::debug!("attempt {generation} cancelled during upload");
            return;
        }
        r = transport.submit_file(&file) => r,
    };

    let receipt = match submitted {
        Ok(receipt) => receipt,
        Err(e) => {
            let failure = JobFailure::Submit(e);
            tracing::error!("attempt {generation}: {failure}");
            shared.apply(generation, |s| {
                s.status = JobStatus::Error(failure.to_string());
            });
            return;
        }
    };

    let accepted = shared.apply(generation, |s| {
        s.status = JobStatus::Processing;
        s.progress = 0;
        s.job_id = Some(receipt.job_id.clone());
        s.filename = Some(receipt.filename.clone());
    });
    if !accepted {
        return;
    }

    let outcome = poller::poll_until_terminal(
        transport.as_ref(),
        &receipt.job_id,
        &policy,
        &cancel,
        |report| {
            shared.apply(generation, |s| {
                s.progress = report.progress;
                if report.step_name.is_some() {
                    s.step = report.step_name.clone();
                }
            });
        },
    )
    .await;

    match outcome {
        PollOutcome::Completed(report) => {
            tracing::info!("attempt {generation}: job {} done", receipt.job_id);
            shared.apply(generation, |s| {
                s.status = JobStatus::Done;
                s.progress = 100;
                s.step = report.step_name.or(s.step.take());
                s.result = report.result;
            });
        }
        PollOutcome::Failed(failure) => {
            tracing::error!("attempt {generation}: job {} failed: {failure}", receipt.job_id);
            shared.apply(generation, |s| {
                s.status = JobStatus::Error(failure.to_string());
            });
        }
        PollOutcome::Cancelled => {
            tracing::debug!("attempt {generation} cancelled while polling");
        }
    }
}
