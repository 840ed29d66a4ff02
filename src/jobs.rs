//! Job lifecycle model shared between the controller and its readers.

use chrono::{DateTime, Local};
use std::path::PathBuf;

/// A local audio file chosen for submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFile {
    /// Location on disk; read once when the upload starts.
    pub path: PathBuf,
    /// Name sent in the multipart part.
    pub filename: String,
}

impl AudioFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self { path, filename }
    }

    /// MIME type guessed from the extension, `application/octet-stream` when unknown.
    pub fn mime(&self) -> String {
        mime_guess::from_path(&self.filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

/// Client-side lifecycle state of the tracked job.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum JobStatus {
    /// No job; initial and post-reset state.
    #[default]
    Idle,
    /// File body is being sent.
    Uploading,
    /// Accepted by the service, being polled.
    Processing,
    /// The service reported completion.
    Done,
    /// Failed (message shown verbatim to the user).
    Error(String),
}

impl JobStatus {
    /// A job is in flight while uploading or processing.
    pub fn is_busy(&self) -> bool {
        matches!(self, JobStatus::Uploading | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Idle => "idle",
            JobStatus::Uploading => "uploading",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error(_) => "error",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            JobStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Everything a reader may observe about the current job.
#[derive(Clone, Debug, Default)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Percentage as last reported by the service.
    pub progress: u8,
    /// Service-assigned id, known once the upload was accepted.
    pub job_id: Option<String>,
    /// File name, echoed by the service once known.
    pub filename: Option<String>,
    /// Human readable pipeline step, if the service sends one.
    pub step: Option<String>,
    /// Processing output delivered with completion.
    pub result: Option<String>,
    /// When the current attempt started.
    pub started_at: Option<DateTime<Local>>,
}

impl JobSnapshot {
    /// Fresh attempt for the given file.
    pub(crate) fn uploading(filename: &str) -> Self {
        Self {
            status: JobStatus::Uploading,
            filename: Some(filename.to_string()),
            started_at: Some(Local::now()),
            ..Self::default()
        }
    }
}
