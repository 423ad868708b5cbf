use stagewatch_logging::{sw_debug, sw_info, sw_warn};

use crate::{
    ArchiveStatus, Channel, Effect, JobSession, JobStatus, LogLine, Msg, RawEvent, ResultFiles, TrackerState,
};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    let effects = match msg {
        Msg::PromptSubmitted(raw) => {
            let prompt = raw.trim();
            if prompt.is_empty() {
                return (state, Vec::new());
            }
            let mut effects = Vec::with_capacity(2);
            if let Some(old) = state.take_job() {
                if old.observing {
                    effects.push(Effect::StopObserving { job_id: old.job_id });
                }
            }
            let request_id = state.begin_submit(prompt.to_string());
            effects.push(Effect::SubmitPrompt {
                request_id,
                prompt: prompt.to_string(),
            });
            state.mark_dirty();
            effects
        }
        Msg::JobAccepted {
            request_id,
            job_id,
            created_at,
        } => match state.finish_submit(request_id) {
            Some(prompt) => {
                sw_info!("job {} accepted", job_id);
                let start = state.start_observing(JobSession::new(job_id, prompt, created_at));
                state.mark_dirty();
                vec![start]
            }
            None => {
                sw_debug!("ignoring acceptance of superseded submission {}", request_id);
                Vec::new()
            }
        },
        Msg::SubmitFailed { request_id, message } => {
            if state.finish_submit(request_id).is_some() {
                sw_warn!("submission failed: {}", message);
                state.set_submit_error(message);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::ResumeJob { job_id, created_at } => {
            let job_id = job_id.trim().to_string();
            if job_id.is_empty() {
                return (state, Vec::new());
            }
            let mut effects = Vec::with_capacity(2);
            if let Some(old) = state.take_job() {
                if old.observing {
                    effects.push(Effect::StopObserving { job_id: old.job_id });
                }
            }
            state.clear_pending_submit();
            sw_info!("resuming observation of job {}", job_id);
            effects.push(state.start_observing(JobSession::new(job_id, String::new(), created_at)));
            state.mark_dirty();
            effects
        }
        Msg::Observed { job_id, event } => with_job(&mut state, &job_id, |job, state| {
            let changed = job.observe(event, state.weights(), state.classifier());
            (changed, settle(job))
        }),
        Msg::StatusPolled { job_id, report } => with_job(&mut state, &job_id, |job, state| {
            let mut changed = false;
            if report.status.is_terminal() {
                let message = report.error.clone().unwrap_or_else(|| format!("job {}", report.status));
                let event = RawEvent::job_terminal(Channel::Poll, report.status, message);
                changed |= job.observe(event, state.weights(), state.classifier());
                changed |= job.accept_result(&report);
                job.result_requested = true;
            } else if report.status == JobStatus::Running {
                changed |= job.set_status(JobStatus::Running);
            }
            (changed, settle(job))
        }),
        Msg::PushDegraded { job_id, reason } => with_job(&mut state, &job_id, |job, _| {
            job.push_log(LogLine {
                channel: Channel::Push,
                agent: None,
                message: format!("push channel unavailable ({reason}); following the job by polling"),
                timestamp: None,
                classified: false,
            });
            job.push_degraded = Some(reason);
            (true, Vec::new())
        }),
        Msg::ObservationClosed { job_id, observation } => with_job(&mut state, &job_id, |job, _| {
            if observation != job.observation {
                sw_debug!("ignoring close of superseded observation {} of {}", observation, job.job_id);
                return (false, Vec::new());
            }
            let changed = job.observing;
            job.observing = false;
            (changed, Vec::new())
        }),
        Msg::ResultFetched { job_id, report } => with_job(&mut state, &job_id, |job, _| {
            if !report.status.is_terminal() {
                // Stage inference ran ahead of the backend; the poll loop delivers the result later.
                sw_debug!("result for {} not ready yet ({})", job.job_id, report.status);
                return (false, Vec::new());
            }
            let changed = job.accept_result(&report);
            (changed, settle(job))
        }),
        Msg::ResultFetchFailed { job_id, message } => with_job(&mut state, &job_id, |job, _| {
            sw_warn!("could not fetch result for {}: {}", job.job_id, message);
            job.push_log(LogLine {
                channel: Channel::Poll,
                agent: None,
                message: format!("result fetch failed: {message}"),
                timestamp: None,
                classified: false,
            });
            (true, Vec::new())
        }),
        Msg::CancelClicked => match state.take_job() {
            Some(job) => {
                sw_info!("stopped observing job {}", job.job_id);
                state.mark_dirty();
                if job.observing {
                    vec![Effect::StopObserving { job_id: job.job_id }]
                } else {
                    Vec::new()
                }
            }
            None => Vec::new(),
        },
        Msg::ArchiveRequested { readme } => {
            let Some(job) = state.current_job_mut() else {
                return (state, Vec::new());
            };
            let ResultFiles::Available(files) = &job.files else {
                sw_debug!("archive requested before the result of {} is available", job.job_id);
                return (state, Vec::new());
            };
            if job.archive == ArchiveStatus::Building {
                return (state, Vec::new());
            }
            let effect = Effect::BuildArchive {
                job_id: job.job_id.clone(),
                files: files.clone(),
                readme,
            };
            job.archive = ArchiveStatus::Building;
            state.mark_dirty();
            vec![effect]
        }
        Msg::ArchiveBuilt { job_id, path, bytes } => with_job(&mut state, &job_id, |job, _| {
            job.archive = ArchiveStatus::Ready { path, bytes };
            (true, Vec::new())
        }),
        Msg::ArchiveFailed { job_id, message } => with_job(&mut state, &job_id, |job, _| {
            job.archive = ArchiveStatus::Failed(message);
            (true, Vec::new())
        }),
        Msg::RestoreHistory(snapshots) => {
            if !snapshots.is_empty() {
                state.restore_history(snapshots);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Tick | Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

/// Runs `f` on the current job when it matches `job_id`, then records history for finished jobs.
fn with_job<F>(state: &mut TrackerState, job_id: &str, f: F) -> Vec<Effect>
where
    F: FnOnce(&mut JobSession, &TrackerState) -> (bool, Vec<Effect>),
{
    let Some(mut job) = state.take_job() else {
        sw_debug!("ignoring message for {}: no active job", job_id);
        return Vec::new();
    };
    if job.job_id != job_id {
        sw_debug!("ignoring stale message for {}", job_id);
        state.set_job(job);
        return Vec::new();
    }

    let (changed, effects) = f(&mut job, state);
    if changed {
        state.mark_dirty();
    }
    if job.status.is_terminal() && (changed || !effects.is_empty()) {
        state.upsert_history(job.snapshot());
    }
    state.set_job(job);
    effects
}

/// Effects owed once a job is terminal: one result fetch, then detaching both channels.
fn settle(job: &mut JobSession) -> Vec<Effect> {
    if !job.status.is_terminal() {
        return Vec::new();
    }
    let mut effects = Vec::new();
    if !job.files.is_available() && !job.result_requested {
        job.result_requested = true;
        effects.push(Effect::FetchResult {
            job_id: job.job_id.clone(),
        });
    }
    // A completed job keeps polling until its files arrive; the poll is the backstop for a lost fetch.
    let done = job.files.is_available() || (job.status == JobStatus::Failed && job.terminal_confirmed);
    if job.observing && done {
        job.observing = false;
        effects.push(Effect::StopObserving {
            job_id: job.job_id.clone(),
        });
    }
    effects
}
