use crate::{StageBoard, StageStatus, StageWeights};

/// Reported while any stage has moved but the weighted sum is still tiny.
pub const PROGRESS_FLOOR: u8 = 5;

/// Weighted overall progress, 0..=100.
///
/// Completed stages count in full; running and failed stages count their
/// intra-stage progress, so a stage failing never lowers the score.
pub fn aggregate(board: &StageBoard, weights: &StageWeights) -> u8 {
    let raw: u32 = board
        .iter()
        .map(|(stage, state)| {
            let weight = u32::from(weights.get(stage));
            match state.status {
                StageStatus::Pending => 0,
                StageStatus::Completed => weight * 100,
                StageStatus::Running | StageStatus::Failed => weight * u32::from(state.intra_progress),
            }
        })
        .sum();

    let overall = (raw / 100).min(100) as u8;
    if board.any_started() && overall < PROGRESS_FLOOR {
        PROGRESS_FLOOR
    } else {
        overall
    }
}
