use stagewatch_core::{update, Msg, TrackerState};

#[test]
fn update_is_noop() {
    let state = TrackerState::new();
    let (next, effects) = update(state.clone(), Msg::NoOp);

    assert_eq!(state, next);
    assert!(effects.is_empty());
}

#[test]
fn messages_for_unknown_jobs_are_ignored() {
    let state = TrackerState::new();
    let (next, effects) = update(
        state.clone(),
        Msg::ObservationClosed {
            job_id: "ghost".to_string(),
            observation: 1,
        },
    );

    assert_eq!(state, next);
    assert!(effects.is_empty());
}
