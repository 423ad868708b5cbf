use std::sync::Once;

use pretty_assertions::assert_eq;
use serde_json::json;
use stagewatch_core::{
    update, ArchiveStatus, Channel, CompletedJobSnapshot, Effect, JobStatus, JobStatusReport, JobView, Msg, RawEvent,
    ReportedStatus, Stage, StageStatus, TrackerState, MAX_LOG_LINES,
};

const JOB: &str = "job-42";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(stagewatch_logging::initialize_for_tests);
}

fn start_job() -> TrackerState {
    init_logging();
    let (state, effects) = update(TrackerState::new(), Msg::PromptSubmitted("  build a todo app \n".to_string()));
    assert_eq!(
        effects,
        vec![Effect::SubmitPrompt {
            request_id: 1,
            prompt: "build a todo app".to_string(),
        }]
    );
    assert!(state.view().submitting);

    let (state, effects) = update(
        state,
        Msg::JobAccepted {
            request_id: 1,
            job_id: JOB.to_string(),
            created_at: "2026-10-16T09:00:00Z".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::StartObserving {
            job_id: JOB.to_string(),
            observation: 1,
        }]
    );
    state
}

fn observe(state: TrackerState, event: RawEvent) -> (TrackerState, Vec<Effect>) {
    update(
        state,
        Msg::Observed {
            job_id: JOB.to_string(),
            event,
        },
    )
}

fn poll(state: TrackerState, report: JobStatusReport) -> (TrackerState, Vec<Effect>) {
    update(
        state,
        Msg::StatusPolled {
            job_id: JOB.to_string(),
            report,
        },
    )
}

fn completed_with(results: serde_json::Value) -> JobStatusReport {
    JobStatusReport {
        results: Some(results),
        ..JobStatusReport::new(JobStatus::Completed)
    }
}

fn job_view(state: &TrackerState) -> JobView {
    state.view().job.expect("job is active")
}

fn stage_status(view: &JobView, stage: Stage) -> StageStatus {
    view.stages.iter().find(|row| row.stage == stage).unwrap().status
}

fn stop() -> Effect {
    Effect::StopObserving {
        job_id: JOB.to_string(),
    }
}

#[test]
fn first_planning_completion_counts_a_quarter() {
    let state = start_job();
    let event = RawEvent::new(Channel::Push, "Task Completed: system design ready").with_agent("Planning Architect");
    let (mut state, effects) = observe(state, event);

    let view = job_view(&state);
    assert!(effects.is_empty());
    assert_eq!(stage_status(&view, Stage::Planning), StageStatus::Completed);
    assert!(view.overall >= 25);
    assert_eq!(view.status, JobStatus::Running);
    assert_eq!(view.log.len(), 1);
    assert!(view.log[0].classified);
    assert!(state.consume_dirty());
}

#[test]
fn duplicate_completion_from_both_channels_changes_nothing() {
    let state = start_job();
    let event = RawEvent::new(Channel::Push, "Task Completed").with_agent("Planning Architect");
    let (state, _) = observe(state, event.clone());
    let before = job_view(&state);

    let replay = RawEvent {
        channel: Channel::Poll,
        ..event
    };
    let (state, effects) = observe(state, replay);
    let after = job_view(&state);

    assert!(effects.is_empty());
    assert_eq!(after.stages, before.stages);
    assert_eq!(after.overall, before.overall);
    assert_eq!(after.status, JobStatus::Running);
}

#[test]
fn poll_alone_completes_the_job_when_push_is_down() {
    let state = start_job();
    let (state, effects) = update(
        state,
        Msg::PushDegraded {
            job_id: JOB.to_string(),
            reason: "connection refused".to_string(),
        },
    );
    assert!(effects.is_empty());

    let (state, effects) = poll(state, JobStatusReport::new(JobStatus::Running));
    assert!(effects.is_empty());
    assert_eq!(job_view(&state).status, JobStatus::Running);

    let (state, effects) = poll(
        state,
        completed_with(json!({
            "frontend": {"files": {"App.jsx": "export default 1;"}},
            "backend": {"code": {"main.py": "print('api')"}},
        })),
    );
    assert_eq!(effects, vec![stop()]);

    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Completed);
    assert!(view.stages.iter().all(|row| row.status == StageStatus::Completed));
    assert_eq!(view.overall, 100);
    assert_eq!(view.push_degraded.as_deref(), Some("connection refused"));
    assert_eq!(view.file_count, Some(2));
    assert!(!view.observing);

    let tree = view.tree.unwrap();
    assert_eq!(tree.lines()[0], "backend/");
}

#[test]
fn push_completion_fetches_the_result_once() {
    let state = start_job();
    let done = RawEvent::new(Channel::Push, "All agents completed successfully")
        .with_agent("System")
        .with_status(ReportedStatus::Completed);
    let (state, effects) = observe(state, done.clone());
    assert_eq!(
        effects,
        vec![Effect::FetchResult {
            job_id: JOB.to_string()
        }]
    );
    assert!(job_view(&state).observing);
    assert_eq!(job_view(&state).file_count, None);

    // A second terminal event must not trigger another fetch.
    let (state, effects) = observe(state, done);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::ResultFetched {
            job_id: JOB.to_string(),
            report: completed_with(json!({"raw_output": "```python\nprint(1)\n```"})),
        },
    );
    assert_eq!(effects, vec![stop()]);
    let files = state.job().unwrap().files.files().cloned().unwrap();
    assert_eq!(files.get("script1.py").map(String::as_str), Some("print(1)"));

    // A late poll with a different payload does not replace the files.
    let (state, effects) = poll(state, completed_with(json!({"files": {"other.py": "x"}})));
    assert!(effects.is_empty());
    assert_eq!(job_view(&state).file_count, Some(1));
}

#[test]
fn backend_failure_stops_observation_and_keeps_progress() {
    let state = start_job();
    let (state, _) = observe(
        state,
        RawEvent::new(Channel::Push, "Task Completed").with_agent("Planning Architect"),
    );
    let report = JobStatusReport {
        error: Some("LLM quota exceeded".to_string()),
        ..JobStatusReport::new(JobStatus::Failed)
    };
    let (state, effects) = poll(state, report);

    assert_eq!(effects, vec![stop()]);
    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("LLM quota exceeded"));
    assert_eq!(stage_status(&view, Stage::Planning), StageStatus::Completed);
    assert_eq!(stage_status(&view, Stage::Deployment), StageStatus::Failed);
    assert_eq!(view.overall, 25);
    assert_eq!(view.file_count, None);

    let history = state.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, JobStatus::Failed);
    assert_eq!(history[0].error.as_deref(), Some("LLM quota exceeded"));
}

#[test]
fn overall_progress_never_decreases() {
    let mut state = start_job();
    let events = vec![
        RawEvent::new(Channel::Push, "Executing endpoint generation").with_agent("Backend Engineer"),
        RawEvent::new(Channel::Push, "").with_progress("planner", 60),
        RawEvent::new(Channel::Push, "Backend build failed").with_agent("Backend Engineer"),
        RawEvent::new(Channel::Poll, "Thinking about layout").with_agent("Frontend Developer"),
        RawEvent::new(Channel::Push, "Task Completed").with_agent("Planning Architect"),
        RawEvent::new(Channel::Poll, "Task Completed").with_agent("Planning Architect"),
        RawEvent::new(Channel::Push, "Frontend: 80% complete"),
        RawEvent::new(Channel::Push, "Executing task 3f2a9c1e-1b2c-4d5e-8f90-0a1b2c3d4e5f"),
        RawEvent::new(Channel::Push, "All agents completed successfully")
            .with_agent("System")
            .with_status(ReportedStatus::Completed),
    ];

    let mut seen = vec![job_view(&state).overall];
    for event in events {
        let (next, _) = observe(state, event);
        state = next;
        seen.push(job_view(&state).overall);
    }

    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]), "progress went backwards: {seen:?}");
    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(stage_status(&view, Stage::Backend), StageStatus::Failed);
    assert_eq!(stage_status(&view, Stage::Testing), StageStatus::Completed);
}

#[test]
fn inferred_completion_waits_for_the_backend_result() {
    let mut state = start_job();
    let agents = [
        "Planning Architect",
        "Backend Engineer",
        "Frontend Developer",
        "QA Engineer",
        "DevOps Engineer",
    ];
    let mut last_effects = Vec::new();
    for agent in agents {
        let event = RawEvent::new(Channel::Push, "done")
            .with_agent(agent)
            .with_status(ReportedStatus::Completed);
        let (next, effects) = observe(state, event);
        state = next;
        last_effects = effects;
    }
    assert_eq!(
        last_effects,
        vec![Effect::FetchResult {
            job_id: JOB.to_string()
        }]
    );
    assert_eq!(job_view(&state).status, JobStatus::Completed);
    assert!(job_view(&state).observing);

    let (state, effects) = update(
        state,
        Msg::ResultFetched {
            job_id: JOB.to_string(),
            report: JobStatusReport::new(JobStatus::Running),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(job_view(&state).file_count, None);

    let (state, effects) = poll(state, completed_with(json!({"files": {"main.py": "x"}})));
    assert_eq!(effects, vec![stop()]);
    assert_eq!(job_view(&state).file_count, Some(1));
}

fn finish_stages(mut state: TrackerState, failing_agent: Option<&str>) -> TrackerState {
    let agents = [
        "Planning Architect",
        "Backend Engineer",
        "Frontend Developer",
        "QA Engineer",
        "DevOps Engineer",
    ];
    for agent in agents {
        let status = if failing_agent == Some(agent) {
            ReportedStatus::Failed
        } else {
            ReportedStatus::Completed
        };
        let (next, _) = observe(state, RawEvent::new(Channel::Push, "done").with_agent(agent).with_status(status));
        state = next;
    }
    state
}

#[test]
fn backend_failure_overrides_inferred_completion() {
    let state = finish_stages(start_job(), None);
    assert_eq!(job_view(&state).status, JobStatus::Completed);
    assert!(job_view(&state).observing);

    let report = JobStatusReport {
        error: Some("post-processing crashed".to_string()),
        ..JobStatusReport::new(JobStatus::Failed)
    };
    let (state, effects) = poll(state, report);

    assert_eq!(effects, vec![stop()]);
    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.error.as_deref(), Some("post-processing crashed"));
    assert_eq!(view.file_count, None);
    assert_eq!(state.history()[0].status, JobStatus::Failed);

    // Once the backend has spoken, a later terminal word does not flip it again.
    let (state, _) = poll(state, completed_with(json!({"main.py": "x"})));
    assert_eq!(job_view(&state).status, JobStatus::Failed);
}

#[test]
fn backend_completion_overrides_inferred_failure() {
    let state = finish_stages(start_job(), Some("Backend Engineer"));
    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Failed);
    assert!(view.observing);

    let (state, effects) = poll(state, completed_with(json!({"main.py": "x"})));

    assert_eq!(effects, vec![stop()]);
    let view = job_view(&state);
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.file_count, Some(1));
    assert_eq!(stage_status(&view, Stage::Backend), StageStatus::Failed);
    assert_eq!(state.history()[0].status, JobStatus::Completed);
}

#[test]
fn empty_result_is_not_the_same_as_no_result() {
    let state = start_job();
    assert_eq!(job_view(&state).file_count, None);

    let (state, _) = poll(state, completed_with(json!({"summary": "nothing generated"})));
    let view = job_view(&state);
    assert_eq!(view.file_count, Some(0));
    assert_eq!(view.tree.map(|t| t.is_empty()), Some(true));
}

#[test]
fn new_prompt_replaces_the_observed_job() {
    let state = start_job();
    let (state, effects) = update(state, Msg::PromptSubmitted("second idea".to_string()));
    assert_eq!(
        effects,
        vec![
            stop(),
            Effect::SubmitPrompt {
                request_id: 2,
                prompt: "second idea".to_string(),
            },
        ]
    );
    assert!(state.job().is_none());

    // Acceptance of the superseded request is ignored.
    let (state, effects) = update(
        state,
        Msg::JobAccepted {
            request_id: 1,
            job_id: "late".to_string(),
            created_at: String::new(),
        },
    );
    assert!(effects.is_empty());
    assert!(state.job().is_none());

    let (state, _) = update(
        state,
        Msg::JobAccepted {
            request_id: 2,
            job_id: "job-43".to_string(),
            created_at: String::new(),
        },
    );
    let before = state.clone();
    let (state, effects) = observe(
        state,
        RawEvent::new(Channel::Push, "Task Completed").with_agent("Planning Architect"),
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn resuming_a_known_job_starts_observing_it() {
    let state = start_job();
    let (state, effects) = update(
        state,
        Msg::ResumeJob {
            job_id: " job-7 ".to_string(),
            created_at: "2026-10-16T10:00:00Z".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![
            stop(),
            Effect::StartObserving {
                job_id: "job-7".to_string(),
                observation: 2,
            },
        ]
    );
    let view = job_view(&state);
    assert_eq!(view.job_id, "job-7");
    assert_eq!(view.status, JobStatus::Pending);
    assert!(view.observing);

    let (_, effects) = update(
        state,
        Msg::ResumeJob {
            job_id: "  ".to_string(),
            created_at: String::new(),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn close_of_a_replaced_observation_is_ignored() {
    let state = start_job();
    let (state, effects) = update(
        state,
        Msg::ResumeJob {
            job_id: JOB.to_string(),
            created_at: String::new(),
        },
    );
    assert_eq!(
        effects,
        vec![
            stop(),
            Effect::StartObserving {
                job_id: JOB.to_string(),
                observation: 2,
            },
        ]
    );

    // The first channel pair shuts down after the second one started.
    let (state, effects) = update(
        state,
        Msg::ObservationClosed {
            job_id: JOB.to_string(),
            observation: 1,
        },
    );
    assert!(effects.is_empty());
    assert!(job_view(&state).observing);

    let (state, _) = update(
        state,
        Msg::ObservationClosed {
            job_id: JOB.to_string(),
            observation: 2,
        },
    );
    assert!(!job_view(&state).observing);
}

#[test]
fn submit_failure_is_reported() {
    init_logging();
    let (state, _) = update(TrackerState::new(), Msg::PromptSubmitted("idea".to_string()));
    let (state, effects) = update(
        state,
        Msg::SubmitFailed {
            request_id: 1,
            message: "http status 500".to_string(),
        },
    );
    assert!(effects.is_empty());
    let view = state.view();
    assert!(!view.submitting);
    assert_eq!(view.submit_error.as_deref(), Some("http status 500"));

    let (_, effects) = update(state, Msg::PromptSubmitted("   ".to_string()));
    assert!(effects.is_empty());
}

#[test]
fn cancel_detaches_locally() {
    let state = start_job();
    let (state, effects) = update(state, Msg::CancelClicked);
    assert_eq!(effects, vec![stop()]);
    assert!(state.job().is_none());

    let (_, effects) = update(state, Msg::CancelClicked);
    assert!(effects.is_empty());
}

#[test]
fn archive_is_built_only_from_available_files() {
    let state = start_job();
    let (state, effects) = update(state, Msg::ArchiveRequested { readme: None });
    assert!(effects.is_empty());

    let (state, _) = poll(state, completed_with(json!({"files": {"main.py": "x", "README.md": "# hi"}})));
    let (state, effects) = update(
        state,
        Msg::ArchiveRequested {
            readme: Some("# Todo app".to_string()),
        },
    );
    let files = state.job().unwrap().files.files().cloned().unwrap();
    assert_eq!(
        effects,
        vec![Effect::BuildArchive {
            job_id: JOB.to_string(),
            files,
            readme: Some("# Todo app".to_string()),
        }]
    );
    assert_eq!(job_view(&state).archive, ArchiveStatus::Building);

    let (state, effects) = update(state, Msg::ArchiveRequested { readme: None });
    assert!(effects.is_empty());

    let (state, _) = update(
        state,
        Msg::ArchiveFailed {
            job_id: JOB.to_string(),
            message: "disk full".to_string(),
        },
    );
    let view = job_view(&state);
    assert_eq!(view.archive, ArchiveStatus::Failed("disk full".to_string()));
    assert_eq!(view.status, JobStatus::Completed);

    let (state, _) = update(state, Msg::ArchiveRequested { readme: None });
    let (state, _) = update(
        state,
        Msg::ArchiveBuilt {
            job_id: JOB.to_string(),
            path: "out/generated-project.zip".to_string(),
            bytes: 512,
        },
    );
    assert_eq!(
        state.history()[0].archive_path.as_deref(),
        Some("out/generated-project.zip")
    );
}

#[test]
fn display_log_is_capped() {
    let mut state = start_job();
    for n in 0..MAX_LOG_LINES + 10 {
        let (next, _) = observe(state, RawEvent::new(Channel::Push, format!("heartbeat {n}")));
        state = next;
    }
    let view = job_view(&state);
    assert_eq!(view.log.len(), MAX_LOG_LINES);
    assert_eq!(view.log[0].message, "heartbeat 10");
    assert!(view.log.iter().all(|line| !line.classified));
}

#[test]
fn restored_history_is_listed() {
    init_logging();
    let snapshot = CompletedJobSnapshot {
        job_id: "old".to_string(),
        status: JobStatus::Completed,
        created_at: "2026-10-01T12:00:00Z".to_string(),
        file_count: Some(3),
        archive_path: None,
        error: None,
    };
    let (mut state, _) = update(TrackerState::new(), Msg::RestoreHistory(vec![snapshot.clone()]));
    assert_eq!(state.view().history, vec![snapshot]);
    assert!(state.consume_dirty());
}
