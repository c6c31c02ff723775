use std::fmt;

use serde::Serialize;

use super::StageName;

/// Pipeline phase of a job. Transitions only move forward; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phase {
    Queued,
    Fetching,
    Extraction,
    Filtering,
    TextPreparation,
    Stage(StageName),
    Synthesis,
    Persisting,
    Done,
    Failed,
}

pub const FIRST_STAGE_PERCENTAGE: u8 = 40;
pub const STAGE_PERCENTAGE_SPAN: u8 = 45;

impl Phase {
    pub fn milestone(&self) -> Option<u8> {
        match self {
            Phase::Queued => Some(0),
            Phase::Fetching => Some(5),
            Phase::Extraction => Some(15),
            Phase::Filtering => Some(25),
            Phase::TextPreparation => Some(35),
            Phase::Stage(_) => None,
            Phase::Synthesis => Some(88),
            Phase::Persisting => Some(92),
            Phase::Done => Some(100),
            Phase::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }

    pub fn task_state(&self) -> TaskState {
        match self {
            Phase::Queued => TaskState::Pending,
            Phase::Done => TaskState::Success,
            Phase::Failed => TaskState::Failure,
            _ => TaskState::Progress,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Phase::Queued => "queued",
            Phase::Fetching => "fetching",
            Phase::Extraction => "extraction",
            Phase::Filtering => "filtering",
            Phase::TextPreparation => "text_preparation",
            Phase::Stage(stage) => stage.as_str(),
            Phase::Synthesis => "synthesis",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Percentage for stage `index` (zero-based) out of `total` stages.
pub fn stage_percentage(index: usize, total: usize) -> u8 {
    if total == 0 {
        return FIRST_STAGE_PERCENTAGE;
    }
    let offset = (index.min(total) * STAGE_PERCENTAGE_SPAN as usize) / total;
    FIRST_STAGE_PERCENTAGE + offset as u8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub phase: Phase,
    pub percentage: u8,
    pub label: String,
}

impl ProgressState {
    pub fn new(phase: Phase, percentage: u8, label: impl Into<String>) -> Self {
        Self {
            phase,
            percentage: percentage.min(100),
            label: label.into(),
        }
    }

    pub fn at_milestone(phase: Phase, label: impl Into<String>) -> Self {
        let percentage = phase.milestone().unwrap_or(0);
        Self::new(phase, percentage, label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Pending,
    Progress,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Progress => "PROGRESS",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
