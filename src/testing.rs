//! Test doubles: a scripted in-memory `Transport` and a canned HTTP server.

use async_trait::async_trait;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::Notify,
    task::JoinHandle,
};

use crate::{
    error::TransportError,
    jobs::AudioFile,
    transport::{ProgressReport, RemoteStatus, SubmitReceipt, Transport},
};

/// Scripted answer for one status query.
pub(crate) enum Step {
    Report(ProgressReport),
    Fail(TransportError),
}

/// Replays queued answers. An exhausted status script never answers, which
/// keeps a job parked in `Processing` until it is cancelled.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    submits_script: Mutex<VecDeque<Result<SubmitReceipt, TransportError>>>,
    statuses: Mutex<VecDeque<Step>>,
    submit_gate: Option<Arc<Notify>>,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
}

pub(crate) fn unavailable() -> TransportError {
    TransportError::Status {
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        detail: "try later".into(),
    }
}

pub(crate) fn report(status: RemoteStatus, progress: u8) -> ProgressReport {
    ProgressReport {
        status,
        progress,
        filename: "a.wav".into(),
        error: None,
        step_name: None,
        result: None,
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block every submit until the returned handle is notified.
    pub fn gated_submit(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.submit_gate = Some(gate.clone());
        (self, gate)
    }

    pub fn accept(self, job_id: &str, filename: &str) -> Self {
        self.push_submit(Ok(SubmitReceipt {
            status: "accepted".into(),
            job_id: job_id.into(),
            filename: filename.into(),
        }));
        self
    }

    pub fn reject(self, err: TransportError) -> Self {
        self.push_submit(Err(err));
        self
    }

    pub fn progress(self, progress: u8) -> Self {
        self.push(Step::Report(report(RemoteStatus::InProgress, progress)));
        self
    }

    pub fn completed(self, result: Option<&str>) -> Self {
        let mut r = report(RemoteStatus::Completed, 100);
        r.result = result.map(str::to_string);
        self.push(Step::Report(r));
        self
    }

    pub fn failed(self, error: Option<&str>) -> Self {
        let mut r = report(RemoteStatus::Failed, 0);
        r.error = error.map(str::to_string);
        self.push(Step::Report(r));
        self
    }

    pub fn poll_error(self) -> Self {
        self.push(Step::Fail(unavailable()));
        self
    }

    pub fn push(&self, step: Step) {
        self.statuses.lock().unwrap().push_back(step);
    }

    pub fn push_submit(&self, r: Result<SubmitReceipt, TransportError>) {
        self.submits_script.lock().unwrap().push_back(r);
    }

    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn submit_file(&self, file: &AudioFile) -> Result<SubmitReceipt, TransportError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.submit_gate {
            gate.notified().await;
        }
        let next = self.submits_script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(SubmitReceipt {
                status: "accepted".into(),
                job_id: "j1".into(),
                filename: file.filename.clone(),
            })
        })
    }

    async fn fetch_status(&self, _job_id: &str) -> Result<ProgressReport, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Step::Report(r)) => Ok(r),
            Some(Step::Fail(e)) => Err(e),
            None => std::future::pending().await,
        }
    }
}

/// Write a small fake audio file into `dir`.
pub(crate) fn write_audio(dir: &tempfile::TempDir, name: &str) -> AudioFile {
    let path = dir.path().join(name);
    std::fs::write(&path, b"RIFF....WAVEfmt ").unwrap();
    AudioFile::new(path)
}

/// Answer one connection per `(status line, body)` pair, in order, and
/// return the raw requests once all were served.
pub(crate) async fn serve(responses: &[(&str, &str)]) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let responses: Vec<String> = responses
        .iter()
        .map(|(status_line, body)| {
            format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
        })
        .collect();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for response in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let mut expected: Option<usize> = None;
            loop {
                let n = sock.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if expected.is_none()
                    && let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n")
                {
                    let head = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    expected = Some(pos + 4 + len);
                }
                if expected.is_some_and(|total| buf.len() >= total) {
                    break;
                }
            }
            sock.write_all(response.as_bytes()).await.unwrap();
            sock.shutdown().await.ok();
            requests.push(String::from_utf8_lossy(&buf).into_owned());
        }
        requests
    });

    (base, handle)
}
