//! Status polling loop for an accepted job.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    config::PollingCfg,
    error::JobFailure,
    transport::{ProgressReport, RemoteStatus, Transport},
};

/// Cadence and failure tolerance of the poll loop.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Fixed delay between queries; no backoff, no jitter.
    pub interval: Duration,
    /// Consecutive failed queries tolerated before giving up.
    pub max_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_retries: 0,
        }
    }
}

impl From<&PollingCfg> for PollPolicy {
    fn from(cfg: &PollingCfg) -> Self {
        Self {
            interval: cfg.interval(),
            max_retries: cfg.max_poll_retries,
        }
    }
}

/// How a poll loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The service reported `completed`; carries the final report.
    Completed(ProgressReport),
    /// Remote failure or a transport failure past the retry budget.
    Failed(JobFailure),
    /// The owner abandoned the job.
    Cancelled,
}

/// Query `job_id` until it reaches a terminal status, a transport failure
/// exhausts the retry budget, or `cancel` fires.
///
/// `on_progress` sees every non-terminal report, in the order received.
pub async fn poll_until_terminal<F>(
    transport: &dyn Transport,
    job_id: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> PollOutcome
where
    F: FnMut(&ProgressReport),
{
    let mut consecutive_failures = 0u32;

    loop {
        let res = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            r = transport.fetch_status(job_id) => r,
        };

        match res {
            Ok(report) => {
                consecutive_failures = 0;
                match report.status {
                    RemoteStatus::Completed => {
                        tracing::info!("job {job_id} completed");
                        return PollOutcome::Completed(report);
                    }
                    RemoteStatus::Failed => {
                        tracing::warn!("job {job_id} failed remotely: {:?}", report.error);
                        return PollOutcome::Failed(JobFailure::remote(report.error));
                    }
                    RemoteStatus::InProgress => {
                        tracing::debug!("job {job_id} at {}%", report.progress);
                        on_progress(&report);
                    }
                }
            }
            Err(e) if consecutive_failures >= policy.max_retries => {
                tracing::error!("status query for job {job_id} failed: {e}");
                return PollOutcome::Failed(JobFailure::Poll(e));
            }
            Err(e) => {
                consecutive_failures += 1;
                tracing::warn!(
                    "status query for job {job_id} failed ({consecutive_failures}/{}): {e}",
                    policy.max_retries
                );
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}
