use crate::{JobStatus, Signal, SignalKind, Stage, StageState, StageStatus};

/// Intra-stage progress assigned to each non-terminal signal kind.
pub const STARTED_PROGRESS: u8 = 20;
pub const THINKING_PROGRESS: u8 = 30;
pub const EXECUTING_PROGRESS: u8 = 50;
/// Highest intra-stage progress a stage can reach without completing.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

/// Per-stage state machines for one job.
///
/// `Pending -> Running -> {Completed | Failed}`. Terminal states absorb every
/// later signal, which keeps the board idempotent when the push and poll
/// channels deliver the same news twice.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageBoard {
    stages: [StageState; 5],
}

impl StageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, stage: Stage) -> &StageState {
        &self.stages[stage.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, &StageState)> {
        Stage::ALL.into_iter().map(move |stage| (stage, self.get(stage)))
    }

    /// Applies a stage-scoped signal. Returns whether the board changed.
    ///
    /// Job-scoped signals are ignored here; use [`StageBoard::force_terminal`].
    pub fn apply(&mut self, signal: &Signal) -> bool {
        let Some(stage) = signal.stage else {
            return false;
        };
        if signal.inferred && signal.kind.is_terminal() {
            return false;
        }

        let state = &mut self.stages[stage.index()];
        if state.status.is_terminal() {
            return false;
        }

        let before = state.clone();
        match signal.kind {
            SignalKind::Completed => {
                state.status = StageStatus::Completed;
                state.intra_progress = 100;
            }
            SignalKind::Failed => {
                state.status = StageStatus::Failed;
            }
            SignalKind::Started => state.bump(STARTED_PROGRESS),
            SignalKind::Thinking => state.bump(THINKING_PROGRESS),
            SignalKind::Executing => state.bump(EXECUTING_PROGRESS),
            SignalKind::PercentHint(hint) => state.bump(hint.min(MAX_RUNNING_PROGRESS)),
        }
        if !signal.raw_text.is_empty() {
            state.last_message = Some(signal.raw_text.clone());
        }
        *state != before
    }

    /// Forces every non-terminal stage to the job's terminal status.
    pub fn force_terminal(&mut self, status: JobStatus) -> bool {
        let target = match status {
            JobStatus::Completed => StageStatus::Completed,
            JobStatus::Failed => StageStatus::Failed,
            JobStatus::Pending | JobStatus::Running => return false,
        };

        let mut changed = false;
        for state in self.stages.iter_mut().filter(|s| !s.status.is_terminal()) {
            state.status = target;
            if target == StageStatus::Completed {
                state.intra_progress = 100;
            }
            changed = true;
        }
        changed
    }

    pub fn all_terminal(&self) -> bool {
        self.stages.iter().all(|s| s.status.is_terminal())
    }

    pub fn any_failed(&self) -> bool {
        self.stages.iter().any(|s| s.status == StageStatus::Failed)
    }

    pub fn any_started(&self) -> bool {
        self.stages.iter().any(|s| s.status != StageStatus::Pending)
    }

    /// Best guess at which stage unattributed work belongs to: the only running
    /// stage if there is exactly one, otherwise the first pending stage after
    /// the last completed one.
    pub fn likely_active_stage(&self) -> Option<Stage> {
        let mut running = self
            .iter()
            .filter(|(_, s)| s.status == StageStatus::Running)
            .map(|(stage, _)| stage);
        if let (Some(only), None) = (running.next(), running.next()) {
            return Some(only);
        }

        let after = self
            .iter()
            .filter(|(_, s)| s.status == StageStatus::Completed)
            .map(|(stage, _)| stage.index() + 1)
            .max()
            .unwrap_or(0);
        Stage::ALL[after.min(Stage::ALL.len())..]
            .iter()
            .copied()
            .find(|stage| self.get(*stage).status == StageStatus::Pending)
    }
}

impl StageState {
    fn bump(&mut self, progress: u8) {
        self.status = StageStatus::Running;
        self.intra_progress = self.intra_progress.max(progress);
    }
}
