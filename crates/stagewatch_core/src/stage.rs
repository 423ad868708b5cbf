use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the five fixed phases of a generation job, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Planning,
    Backend,
    Frontend,
    Testing,
    Deployment,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Planning,
        Stage::Backend,
        Stage::Frontend,
        Stage::Testing,
        Stage::Deployment,
    ];

    pub fn index(self) -> usize {
        match self {
            Stage::Planning => 0,
            Stage::Backend => 1,
            Stage::Frontend => 2,
            Stage::Testing => 3,
            Stage::Deployment => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Backend => "backend",
            Stage::Frontend => "frontend",
            Stage::Testing => "testing",
            Stage::Deployment => "deployment",
        }
    }

    /// Key used by the backend's progress maps.
    pub fn wire_key(self) -> &'static str {
        match self {
            Stage::Planning => "planner",
            Stage::Backend => "backend",
            Stage::Frontend => "frontend",
            Stage::Testing => "tester",
            Stage::Deployment => "deployment",
        }
    }

    /// Accepts either the wire key or the label.
    pub fn from_key(key: &str) -> Option<Stage> {
        let key = key.trim();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.wire_key().eq_ignore_ascii_case(key) || stage.label().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy)]
enum Needle {
    /// Case-insensitive substring anywhere in the text.
    Substring(&'static str),
    /// Case-insensitive match against a whole alphanumeric token.
    Word(&'static str),
}

/// Synonym table, scanned top to bottom; the first hit names the stage.
const SYNONYMS: &[(Needle, Stage)] = &[
    (Needle::Substring("planning"), Stage::Planning),
    (Needle::Substring("planner"), Stage::Planning),
    (Needle::Substring("architect"), Stage::Planning),
    (Needle::Substring("frontend"), Stage::Frontend),
    (Needle::Substring("front-end"), Stage::Frontend),
    (Needle::Substring("front end"), Stage::Frontend),
    (Needle::Substring("backend"), Stage::Backend),
    (Needle::Substring("back-end"), Stage::Backend),
    (Needle::Substring("back end"), Stage::Backend),
    (Needle::Substring("quality"), Stage::Testing),
    (Needle::Word("qa"), Stage::Testing),
    (Needle::Word("test"), Stage::Testing),
    (Needle::Word("tests"), Stage::Testing),
    (Needle::Word("tester"), Stage::Testing),
    (Needle::Word("testing"), Stage::Testing),
    (Needle::Substring("devops"), Stage::Deployment),
    (Needle::Substring("deploy"), Stage::Deployment),
];

/// Resolves free text (an agent name or a log line) to a stage via the fixed synonym table.
pub fn resolve_stage(text: &str) -> Option<Stage> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    SYNONYMS
        .iter()
        .find(|(needle, _)| match needle {
            Needle::Substring(s) => lower.contains(s),
            Needle::Word(w) => words.contains(w),
        })
        .map(|(_, stage)| *stage)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StageState {
    pub status: StageStatus,
    /// Progress within the stage, 0..=100.
    pub intra_progress: u8,
    pub last_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeightsError {
    #[error("stage weights must sum to 100, got {0}")]
    BadSum(u32),
}

/// Per-stage share of the overall progress score. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u8; 5]", into = "[u8; 5]")]
pub struct StageWeights([u8; 5]);

impl StageWeights {
    /// Weights in canonical stage order.
    pub fn new(weights: [u8; 5]) -> Result<Self, WeightsError> {
        let sum: u32 = weights.iter().map(|w| u32::from(*w)).sum();
        if sum != 100 {
            return Err(WeightsError::BadSum(sum));
        }
        Ok(Self(weights))
    }

    pub fn get(&self, stage: Stage) -> u8 {
        self.0[stage.index()]
    }
}

impl Default for StageWeights {
    fn default() -> Self {
        Self([25, 25, 25, 15, 10])
    }
}

impl TryFrom<[u8; 5]> for StageWeights {
    type Error = WeightsError;

    fn try_from(weights: [u8; 5]) -> Result<Self, Self::Error> {
        Self::new(weights)
    }
}

impl From<StageWeights> for [u8; 5] {
    fn from(weights: StageWeights) -> Self {
        weights.0
    }
}
