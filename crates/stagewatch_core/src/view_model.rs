use crate::{
    ArchiveStatus, CompletedJobSnapshot, FileMap, FileTree, JobId, JobStatus, LogLine, Stage, StageStatus,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerView {
    pub submitting: bool,
    pub submit_error: Option<String>,
    pub job: Option<JobView>,
    pub history: Vec<CompletedJobSnapshot>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobView {
    pub job_id: JobId,
    pub prompt: String,
    pub created_at: String,
    pub status: JobStatus,
    pub overall: u8,
    pub stages: Vec<StageRowView>,
    pub log: Vec<LogLine>,
    /// `None` until the result is available; `Some(0)` for an empty result.
    pub file_count: Option<usize>,
    pub tree: Option<FileTree>,
    /// Canonical files for browsing; `None` until available.
    pub files: Option<FileMap>,
    pub error: Option<String>,
    pub push_degraded: Option<String>,
    pub archive: ArchiveStatus,
    pub observing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRowView {
    pub stage: Stage,
    pub status: StageStatus,
    pub intra_progress: u8,
    pub weight: u8,
    pub last_message: Option<String>,
}
