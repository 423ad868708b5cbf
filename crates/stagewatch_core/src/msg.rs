use crate::{CompletedJobSnapshot, JobId, JobStatusReport, RawEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User submitted a prompt; replaces any job currently observed.
    PromptSubmitted(String),
    /// The service accepted submission `request_id`.
    JobAccepted {
        request_id: u64,
        job_id: JobId,
        created_at: String,
    },
    SubmitFailed { request_id: u64, message: String },
    /// Start following a job submitted earlier, by its id.
    ResumeJob { job_id: JobId, created_at: String },
    /// Raw event from the push channel, the log backfill, or a poll.
    Observed { job_id: JobId, event: RawEvent },
    /// Poll of the job-status resource.
    StatusPolled { job_id: JobId, report: JobStatusReport },
    /// Push transport failed; polling continues alone.
    PushDegraded { job_id: JobId, reason: String },
    /// Both channels of observation `observation` have stopped.
    ObservationClosed { job_id: JobId, observation: u64 },
    /// One-shot fetch of the final result.
    ResultFetched { job_id: JobId, report: JobStatusReport },
    ResultFetchFailed { job_id: JobId, message: String },
    /// User cancelled observation of the current job.
    CancelClicked,
    /// User asked for the archive, with an optional README for its root.
    ArchiveRequested { readme: Option<String> },
    ArchiveBuilt {
        job_id: JobId,
        path: String,
        bytes: u64,
    },
    ArchiveFailed { job_id: JobId, message: String },
    /// Restore previously finished jobs from persisted state.
    RestoreHistory(Vec<CompletedJobSnapshot>),
    /// Render tick.
    Tick,
    NoOp,
}
