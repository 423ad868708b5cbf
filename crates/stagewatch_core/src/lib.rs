//! Stagewatch core: classification, stage tracking, result normalization and the pure job state machine.
mod board;
mod classify;
mod effect;
mod event;
mod fences;
mod msg;
mod normalize;
mod preview;
mod progress;
mod report;
mod stage;
mod state;
mod tree;
mod update;
mod view_model;

pub use board::{StageBoard, EXECUTING_PROGRESS, MAX_RUNNING_PROGRESS, STARTED_PROGRESS, THINKING_PROGRESS};
pub use classify::{classify, rules, ClassifierConfig, Rule, RuleCategory, RuleInput};
pub use effect::Effect;
pub use event::{Channel, RawEvent, ReportedStatus, Signal, SignalKind};
pub use fences::{extract_code_blocks, CodeBlock, SyntheticNamer};
pub use msg::Msg;
pub use normalize::{detect_shape, looks_like_path, normalize, FileMap, ResultShape, Section, ShapeKind};
pub use preview::{prepare_preview, MAX_PREVIEW_CONTENT};
pub use progress::{aggregate, PROGRESS_FLOOR};
pub use report::{JobId, JobStatus, JobStatusReport, JobTicket};
pub use stage::{resolve_stage, Stage, StageState, StageStatus, StageWeights, WeightsError};
pub use state::{
    ArchiveStatus, CompletedJobSnapshot, JobSession, LogLine, ResultFiles, TrackerState, MAX_LOG_LINES,
};
pub use tree::{FileNode, FileTree};
pub use update::update;
pub use view_model::{JobView, StageRowView, TrackerView};
