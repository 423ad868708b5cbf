//! Event classification: raw backend messages to stage-scoped signals.
//!
//! Classification is an ordered table of named rules. Each rule belongs to a
//! category and the first rule to match within a category wins; a match in
//! the `Structured` category ends classification, since explicit status fields
//! on an event are used verbatim. An explicit progress map only carries
//! percentages, so the message text is still read after it.

use std::sync::LazyLock;

use regex_lite::Regex;
use stagewatch_logging::{sw_debug, sw_info, sw_trace};

use crate::{resolve_stage, JobStatus, RawEvent, ReportedStatus, Signal, SignalKind, Stage, StageBoard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Attribute stage-less "work started" events to the likely active stage.
    pub infer_unattributed: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            infer_unattributed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Structured,
    Progress,
    Phase,
    Percent,
}

/// What a rule gets to look at.
pub struct RuleInput<'a> {
    pub event: &'a RawEvent,
    /// Lowercased message text.
    pub text: String,
    /// Stage named by the agent field, else by the message text.
    pub stage: Option<Stage>,
    pub board: &'a StageBoard,
    pub config: &'a ClassifierConfig,
}

impl<'a> RuleInput<'a> {
    pub fn new(event: &'a RawEvent, board: &'a StageBoard, config: &'a ClassifierConfig) -> Self {
        let stage = event
            .agent
            .as_deref()
            .and_then(resolve_stage)
            .or_else(|| resolve_stage(&event.message));
        Self {
            event,
            text: event.message.to_lowercase(),
            stage,
            board,
            config,
        }
    }

    fn agent_stage(&self) -> Option<Stage> {
        self.event.agent.as_deref().and_then(resolve_stage)
    }

    fn mentions_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.text.contains(n))
    }
}

pub struct Rule {
    pub name: &'static str,
    pub category: RuleCategory,
    produce: fn(&RuleInput<'_>) -> Vec<Signal>,
}

impl Rule {
    /// Runs this rule alone. An empty result means the rule did not match.
    pub fn apply(&self, input: &RuleInput<'_>) -> Vec<Signal> {
        (self.produce)(input)
    }
}

const RULES: &[Rule] = &[
    Rule {
        name: "job-status-field",
        category: RuleCategory::Structured,
        produce: job_status_field,
    },
    Rule {
        name: "agent-terminal-status",
        category: RuleCategory::Structured,
        produce: agent_terminal_status,
    },
    Rule {
        name: "job-scoped-status",
        category: RuleCategory::Structured,
        produce: job_scoped_status,
    },
    Rule {
        name: "progress-map",
        category: RuleCategory::Progress,
        produce: progress_map,
    },
    Rule {
        name: "stage-completed-marker",
        category: RuleCategory::Phase,
        produce: stage_completed_marker,
    },
    Rule {
        name: "stage-failed-marker",
        category: RuleCategory::Phase,
        produce: stage_failed_marker,
    },
    Rule {
        name: "stage-progress-marker",
        category: RuleCategory::Phase,
        produce: stage_progress_marker,
    },
    Rule {
        name: "stage-percent-phrase",
        category: RuleCategory::Percent,
        produce: stage_percent_phrase,
    },
    Rule {
        name: "unattributed-work-fallback",
        category: RuleCategory::Phase,
        produce: unattributed_work_fallback,
    },
];

/// The classification rules in evaluation order.
pub fn rules() -> &'static [Rule] {
    RULES
}

/// Classifies one raw event against the current stage states.
///
/// Returns no signals for events that only matter for display.
pub fn classify(event: &RawEvent, board: &StageBoard, config: &ClassifierConfig) -> Vec<Signal> {
    let input = RuleInput::new(event, board, config);
    let mut matched: Vec<RuleCategory> = Vec::new();
    let mut signals = Vec::new();

    for rule in RULES {
        if matched.contains(&rule.category) {
            continue;
        }
        let produced = rule.apply(&input);
        if produced.is_empty() {
            continue;
        }
        sw_trace!("rule {} matched on {} event: {}", rule.name, event.channel, event.message);
        signals.extend(produced);
        if rule.category == RuleCategory::Structured {
            return signals;
        }
        matched.push(rule.category);
    }

    if signals.is_empty() {
        sw_debug!("unclassified {} event: {}", event.channel, event.message);
    }
    signals
}

const COMPLETED_MARKERS: &[&str] = &["completed", "✅", "task completion", "finished"];
const FAILED_MARKERS: &[&str] = &["failed", "❌", "error:"];
const EXECUTING_MARKERS: &[&str] = &[
    "executing",
    "generating",
    "creating",
    "finalizing",
    "reviewing",
    "in progress",
];
const THINKING_MARKERS: &[&str] = &["thinking", "analyzing", "planning implementation"];
const STARTED_MARKERS: &[&str] = &["started", "starting", "initializing", "working on"];
const JOB_DONE_MARKERS: &[&str] = &[
    "all agents completed",
    "all tasks completed",
    "job completed",
    "generation complete",
];
const WORK_START_MARKERS: &[&str] = &["executing task", "starting", "started", "working on"];

static PERCENT_PHRASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3})\s*%\s*(?:completed?|done)").expect("percent phrase pattern is valid")
});

static TASK_ID_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|\btask[ _-]?id\s*[:=#]\s*\S+",
    )
    .expect("task id pattern is valid")
});

fn job_status_field(input: &RuleInput<'_>) -> Vec<Signal> {
    match input.event.job_status {
        Some(JobStatus::Completed) => vec![Signal::for_job(SignalKind::Completed, input.event)],
        Some(JobStatus::Failed) => vec![Signal::for_job(SignalKind::Failed, input.event)],
        _ => Vec::new(),
    }
}

fn agent_terminal_status(input: &RuleInput<'_>) -> Vec<Signal> {
    let Some(stage) = input.agent_stage() else {
        return Vec::new();
    };
    match input.event.status {
        Some(ReportedStatus::Completed) => vec![Signal::for_stage(stage, SignalKind::Completed, input.event)],
        Some(ReportedStatus::Failed) => vec![Signal::for_stage(stage, SignalKind::Failed, input.event)],
        _ => Vec::new(),
    }
}

fn job_scoped_status(input: &RuleInput<'_>) -> Vec<Signal> {
    if input.event.agent.is_none() || input.stage.is_some() {
        return Vec::new();
    }
    match input.event.status {
        Some(ReportedStatus::Failed) => vec![Signal::for_job(SignalKind::Failed, input.event)],
        Some(ReportedStatus::Completed) if input.mentions_any(JOB_DONE_MARKERS) => {
            vec![Signal::for_job(SignalKind::Completed, input.event)]
        }
        _ => Vec::new(),
    }
}

fn progress_map(input: &RuleInput<'_>) -> Vec<Signal> {
    input
        .event
        .progress
        .iter()
        // A zero entry only says the stage has not been touched yet.
        .filter(|(_, value)| **value > 0)
        .filter_map(|(key, value)| {
            let stage = Stage::from_key(key).or_else(|| resolve_stage(key))?;
            let kind = if *value >= 100 {
                SignalKind::Completed
            } else {
                SignalKind::PercentHint(*value as u8)
            };
            Some(Signal::for_stage(stage, kind, input.event))
        })
        .collect()
}

fn stage_completed_marker(input: &RuleInput<'_>) -> Vec<Signal> {
    // "50% completed" is a percentage, not a completion.
    let text = PERCENT_PHRASE.replace_all(&input.text, " ");
    match input.stage {
        Some(stage) if COMPLETED_MARKERS.iter().any(|m| text.contains(m)) => {
            vec![Signal::for_stage(stage, SignalKind::Completed, input.event)]
        }
        _ => Vec::new(),
    }
}

fn stage_failed_marker(input: &RuleInput<'_>) -> Vec<Signal> {
    match input.stage {
        Some(stage) if input.mentions_any(FAILED_MARKERS) => {
            vec![Signal::for_stage(stage, SignalKind::Failed, input.event)]
        }
        _ => Vec::new(),
    }
}

fn stage_progress_marker(input: &RuleInput<'_>) -> Vec<Signal> {
    let Some(stage) = input.stage else {
        return Vec::new();
    };
    // Strongest marker first; the board keeps the maximum anyway.
    let kind = if input.mentions_any(EXECUTING_MARKERS) {
        SignalKind::Executing
    } else if input.mentions_any(THINKING_MARKERS) {
        SignalKind::Thinking
    } else if input.mentions_any(STARTED_MARKERS) {
        SignalKind::Started
    } else {
        return Vec::new();
    };
    vec![Signal::for_stage(stage, kind, input.event)]
}

fn stage_percent_phrase(input: &RuleInput<'_>) -> Vec<Signal> {
    let Some(stage) = input.stage else {
        return Vec::new();
    };
    PERCENT_PHRASE
        .captures(&input.text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map(|pct| {
            let kind = if pct >= 100 {
                SignalKind::Completed
            } else {
                SignalKind::PercentHint(pct as u8)
            };
            vec![Signal::for_stage(stage, kind, input.event)]
        })
        .unwrap_or_default()
}

fn unattributed_work_fallback(input: &RuleInput<'_>) -> Vec<Signal> {
    if !input.config.infer_unattributed || input.stage.is_some() {
        return Vec::new();
    }
    if !TASK_ID_TOKEN.is_match(&input.event.message) || !input.mentions_any(WORK_START_MARKERS) {
        return Vec::new();
    }
    let Some(stage) = input.board.likely_active_stage() else {
        return Vec::new();
    };
    sw_info!(
        "attributing unnamed work to {} (inferred, not reported by the backend)",
        stage
    );
    let mut signal = Signal::for_stage(stage, SignalKind::Started, input.event);
    signal.inferred = true;
    vec![signal]
}
