//! Command-line entry point: upload one file and follow its job to the end.

use anyhow::{Result, anyhow};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing_appender::non_blocking::WorkerGuard;

use audio_job_client::{
    AudioFile, JobSnapshot, JobStatus, UploadCoordinator,
    config::{API_URL_ENV, Config},
    poller::PollPolicy,
    transport::HttpTransport,
};

#[derive(Parser, Debug)]
#[command(version, about = "Upload an audio file and track its processing job")]
struct Args {
    /// Audio file to submit.
    file: PathBuf,

    /// Config file (created with defaults when missing).
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the service base URL.
    #[arg(long, env = API_URL_ENV)]
    api_url: Option<String>,
}

/// Initialise file logging and keep the async writer guard alive.
fn init_logging() -> Result<WorkerGuard> {
    // Log file name in the working directory.
    let log_file = "audio_job_client.log";
    // stdout carries the progress line, so logs go straight to the file.
    let file_appender = tracing_appender::rolling::never(".", log_file);
    // Non-blocking writer plus the guard that flushes it on drop.
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // Plain text, no colour codes, no module targets.
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;
    // Record where the logs end up.
    tracing::info!("logging to {}", log_file);
    Ok(guard)
}

#[tokio::main]
/// Entry point: parse args, start logging, run one job, report the outcome.
async fn main() -> Result<()> {
    // Bad arguments exit here, before anything touches the disk.
    let args = Args::parse();
    // Keep the guard for the whole run so buffered lines are written.
    let _log_guard = init_logging()?;
    // Startup marker.
    tracing::info!("app starting");
    // Upload the file and follow its job.
    let res = run(args).await;
    // Failures go to the log as well as stderr.
    if let Err(ref e) = res {
        tracing::error!("app error: {e}");
    }
    // Shutdown marker.
    tracing::info!("app exiting");
    res
}

/// Upload `args.file` and print status lines until the job settles.
async fn run(args: Args) -> Result<()> {
    if !args.file.is_file() {
        return Err(anyhow!("{} is not a file", args.file.display()));
    }

    // Config file first, then the flag/env override for the base URL.
    let cfg = Config::load_or_default(&args.config)?.with_base_url(args.api_url);
    tracing::info!("service at {}", cfg.server.base_url);

    let transport = HttpTransport::new(&cfg.server)?;
    let coordinator = UploadCoordinator::new(Arc::new(transport), PollPolicy::from(&cfg.polling));
    let mut rx = coordinator.subscribe();

    coordinator.select_file(AudioFile::new(args.file.clone()));
    if !coordinator.start_upload() {
        return Err(anyhow!("upload could not be started"));
    }

    // Print only when the rendered line changes.
    let mut last_line = String::new();
    let final_state = loop {
        let snapshot = rx.borrow_and_update().clone();
        let line = status_line(&snapshot);
        if line != last_line {
            println!("{line}");
            last_line = line;
        }
        if snapshot.status.is_terminal() {
            break snapshot;
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break coordinator.snapshot();
                }
            }
            // Ctrl-C abandons the job before exiting.
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted; abandoning job");
                coordinator.clear_file();
                return Err(anyhow!("interrupted"));
            }
        }
    };

    match final_state.status {
        JobStatus::Done => {
            if let Some(result) = final_state.result {
                println!("{result}");
            }
            Ok(())
        }
        JobStatus::Error(msg) => Err(anyhow!(msg)),
        other => Err(anyhow!("job ended in unexpected state: {}", other.label())),
    }
}

/// One-line human readable rendering of the snapshot.
fn status_line(s: &JobSnapshot) -> String {
    let name = s.filename.as_deref().unwrap_or("-");
    match &s.status {
        JobStatus::Uploading => format!("[uploading] {name}"),
        JobStatus::Processing => match &s.step {
            Some(step) => format!("[processing] {name} {}% {step}", s.progress),
            None => format!("[processing] {name} {}%", s.progress),
        },
        JobStatus::Done => {
            let secs = s
                .started_at
                .map(|t| (chrono::Local::now() - t).num_seconds())
                .unwrap_or_default();
            format!("[done] {name} in {secs}s")
        }
        JobStatus::Error(msg) => format!("[error] {name}: {msg}"),
        JobStatus::Idle => format!("[idle] {name}"),
    }
}
