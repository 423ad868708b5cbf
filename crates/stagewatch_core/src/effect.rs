use crate::{FileMap, JobId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SubmitPrompt { request_id: u64, prompt: String },
    /// Attach both channels; `observation` tags the pair's eventual close.
    StartObserving { job_id: JobId, observation: u64 },
    StopObserving { job_id: JobId },
    /// Fetch the job's final result once.
    FetchResult { job_id: JobId },
    BuildArchive {
        job_id: JobId,
        files: FileMap,
        readme: Option<String>,
    },
}
