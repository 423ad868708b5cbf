use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use stagewatch_logging::sw_info;

use crate::progress::aggregate;
use crate::view_model::{JobView, StageRowView, TrackerView};
use crate::{
    classify, normalize, Channel, ClassifierConfig, Effect, FileMap, FileTree, JobId, JobStatus, JobStatusReport, RawEvent,
    Signal, SignalKind, StageBoard, StageWeights,
};

/// Display log capacity per job; the oldest lines are dropped first.
pub const MAX_LOG_LINES: usize = 500;

/// A raw event as shown to the user, whether or not it moved any stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub channel: Channel,
    pub agent: Option<String>,
    pub message: String,
    pub timestamp: Option<String>,
    pub classified: bool,
}

/// The job's canonical files. `Available` with an empty map means the
/// backend finished but nothing recognisable was in its result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResultFiles {
    #[default]
    NotYetAvailable,
    Available(FileMap),
}

impl ResultFiles {
    pub fn is_available(&self) -> bool {
        matches!(self, ResultFiles::Available(_))
    }

    pub fn files(&self) -> Option<&FileMap> {
        match self {
            ResultFiles::Available(files) => Some(files),
            ResultFiles::NotYetAvailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArchiveStatus {
    #[default]
    Idle,
    Building,
    Ready { path: String, bytes: u64 },
    Failed(String),
}

/// Persisted summary of a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedJobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub created_at: String,
    #[serde(default)]
    pub file_count: Option<usize>,
    #[serde(default)]
    pub archive_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Everything known locally about the job being observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSession {
    pub job_id: JobId,
    pub prompt: String,
    pub created_at: String,
    pub status: JobStatus,
    pub board: StageBoard,
    /// Overall progress; never decreases for the lifetime of the session.
    pub overall: u8,
    pub log: VecDeque<LogLine>,
    pub files: ResultFiles,
    pub error: Option<String>,
    pub push_degraded: Option<String>,
    pub archive: ArchiveStatus,
    pub(crate) observing: bool,
    /// Id of the channel pair currently attached; closes from older ones are ignored.
    pub(crate) observation: u64,
    pub(crate) result_requested: bool,
    /// The backend itself reported the terminal status.
    pub(crate) terminal_confirmed: bool,
}

impl JobSession {
    pub fn new(job_id: JobId, prompt: String, created_at: String) -> Self {
        Self {
            job_id,
            prompt,
            created_at,
            status: JobStatus::Pending,
            board: StageBoard::new(),
            overall: 0,
            log: VecDeque::new(),
            files: ResultFiles::NotYetAvailable,
            error: None,
            push_degraded: None,
            archive: ArchiveStatus::Idle,
            observing: true,
            observation: 0,
            result_requested: false,
            terminal_confirmed: false,
        }
    }

    pub(crate) fn push_log(&mut self, line: LogLine) {
        if self.log.len() == MAX_LOG_LINES {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    /// Classifies one raw event and folds the resulting signals into the session.
    pub(crate) fn observe(&mut self, event: RawEvent, weights: &StageWeights, config: &ClassifierConfig) -> bool {
        let signals = classify(&event, &self.board, config);
        let mut changed = false;
        for signal in &signals {
            changed |= self.apply_signal(signal);
        }
        if !event.message.is_empty() {
            self.push_log(LogLine {
                channel: event.channel,
                agent: event.agent,
                message: event.message,
                timestamp: event.timestamp,
                classified: !signals.is_empty(),
            });
            changed = true;
        }
        changed |= self.recompute(weights);
        changed
    }

    fn apply_signal(&mut self, signal: &Signal) -> bool {
        if signal.is_job_terminal() {
            let status = match signal.kind {
                SignalKind::Failed => JobStatus::Failed,
                _ => JobStatus::Completed,
            };
            let forced = self.board.force_terminal(status);
            if self.terminal_confirmed {
                return self.set_status(status) || forced;
            }
            // The backend's first terminal word replaces whatever was inferred from the stages.
            self.terminal_confirmed = true;
            if self.status == status {
                return forced;
            }
            self.status = status;
            sw_info!("job {} is {} (reported by the backend)", self.job_id, status);
            return true;
        }
        let changed = self.board.apply(signal);
        if changed && self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
        }
        changed
    }

    /// Recomputes overall progress and infers the job's end once every stage is terminal.
    pub(crate) fn recompute(&mut self, weights: &StageWeights) -> bool {
        let mut changed = false;
        if !self.status.is_terminal() && self.board.all_terminal() {
            let status = if self.board.any_failed() {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            };
            changed |= self.set_status(status);
        }
        let overall = self.overall.max(aggregate(&self.board, weights));
        if overall != self.overall {
            self.overall = overall;
            changed = true;
        }
        changed
    }

    pub(crate) fn set_status(&mut self, status: JobStatus) -> bool {
        if self.status == status || self.status.is_terminal() {
            return false;
        }
        self.status = status;
        if status.is_terminal() {
            sw_info!("job {} is {}", self.job_id, status);
        }
        true
    }

    /// Takes the files out of a report carrying the final result. Only the first result counts.
    pub(crate) fn accept_result(&mut self, report: &JobStatusReport) -> bool {
        if report.error.is_some() && self.error.is_none() {
            self.error = report.error.clone();
        }
        if self.files.is_available() {
            return false;
        }
        match (&report.results, report.status) {
            (Some(payload), _) => self.files = ResultFiles::Available(normalize(payload)),
            (None, JobStatus::Completed) => self.files = ResultFiles::Available(FileMap::new()),
            _ => return false,
        }
        true
    }

    pub fn snapshot(&self) -> CompletedJobSnapshot {
        CompletedJobSnapshot {
            job_id: self.job_id.clone(),
            status: self.status,
            created_at: self.created_at.clone(),
            file_count: self.files.files().map(FileMap::len),
            archive_path: match &self.archive {
                ArchiveStatus::Ready { path, .. } => Some(path.clone()),
                _ => None,
            },
            error: self.error.clone(),
        }
    }

    fn view(&self, weights: &StageWeights) -> JobView {
        JobView {
            job_id: self.job_id.clone(),
            prompt: self.prompt.clone(),
            created_at: self.created_at.clone(),
            status: self.status,
            overall: self.overall,
            stages: self
                .board
                .iter()
                .map(|(stage, state)| StageRowView {
                    stage,
                    status: state.status,
                    intra_progress: state.intra_progress,
                    weight: weights.get(stage),
                    last_message: state.last_message.clone(),
                })
                .collect(),
            log: self.log.iter().cloned().collect(),
            file_count: self.files.files().map(FileMap::len),
            tree: self.files.files().map(FileTree::from_files),
            files: self.files.files().cloned(),
            error: self.error.clone(),
            push_degraded: self.push_degraded.clone(),
            archive: self.archive.clone(),
            observing: self.observing,
        }
    }
}

/// State of the single-job tracker.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerState {
    weights: StageWeights,
    classifier: ClassifierConfig,
    job: Option<JobSession>,
    /// Submission awaiting a job id: request id and prompt.
    pending_submit: Option<(u64, String)>,
    next_request_id: u64,
    next_observation: u64,
    submit_error: Option<String>,
    history: Vec<CompletedJobSnapshot>,
    dirty: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(weights: StageWeights, classifier: ClassifierConfig) -> Self {
        Self {
            weights,
            classifier,
            ..Self::default()
        }
    }

    pub fn job(&self) -> Option<&JobSession> {
        self.job.as_ref()
    }

    pub fn history(&self) -> &[CompletedJobSnapshot] {
        &self.history
    }

    pub fn view(&self) -> TrackerView {
        TrackerView {
            submitting: self.pending_submit.is_some(),
            submit_error: self.submit_error.clone(),
            job: self.job.as_ref().map(|job| job.view(&self.weights)),
            history: self.history.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and clears the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn weights(&self) -> &StageWeights {
        &self.weights
    }

    pub(crate) fn classifier(&self) -> &ClassifierConfig {
        &self.classifier
    }

    pub(crate) fn begin_submit(&mut self, prompt: String) -> u64 {
        self.next_request_id += 1;
        let request_id = self.next_request_id;
        self.pending_submit = Some((request_id, prompt));
        self.submit_error = None;
        request_id
    }

    /// Clears a matching pending submission, returning its prompt.
    pub(crate) fn finish_submit(&mut self, request_id: u64) -> Option<String> {
        match &self.pending_submit {
            Some((id, _)) if *id == request_id => self.pending_submit.take().map(|(_, prompt)| prompt),
            _ => None,
        }
    }

    /// Installs `job` as the observed job under a fresh observation id.
    pub(crate) fn start_observing(&mut self, mut job: JobSession) -> Effect {
        self.next_observation += 1;
        job.observation = self.next_observation;
        job.observing = true;
        let effect = Effect::StartObserving {
            job_id: job.job_id.clone(),
            observation: job.observation,
        };
        self.job = Some(job);
        effect
    }

    pub(crate) fn clear_pending_submit(&mut self) {
        self.pending_submit = None;
        self.submit_error = None;
    }

    pub(crate) fn set_submit_error(&mut self, message: String) {
        self.submit_error = Some(message);
    }

    pub(crate) fn take_job(&mut self) -> Option<JobSession> {
        self.job.take()
    }

    pub(crate) fn current_job_mut(&mut self) -> Option<&mut JobSession> {
        self.job.as_mut()
    }

    pub(crate) fn set_job(&mut self, job: JobSession) {
        self.job = Some(job);
    }

    pub(crate) fn restore_history(&mut self, snapshots: Vec<CompletedJobSnapshot>) {
        for snapshot in snapshots {
            self.upsert_history(snapshot);
        }
    }

    pub(crate) fn upsert_history(&mut self, snapshot: CompletedJobSnapshot) {
        match self.history.iter_mut().find(|s| s.job_id == snapshot.job_id) {
            Some(existing) => *existing = snapshot,
            None => self.history.push(snapshot),
        }
    }
}
