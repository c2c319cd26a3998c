//! Stage outcomes
//!
//! Optional stages never fail a run. When one cannot do its job it passes its
//! input through and says so here.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crop,
    Reorder,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Applied,
    /// The stage fell back, fully or for some pages
    Degraded { reason: String },
}

impl StageOutcome {
    pub fn degraded(reason: impl Into<String>) -> Self {
        StageOutcome::Degraded { reason: reason.into() }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, StageOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

impl StageReport {
    pub fn new(stage: Stage, outcome: StageOutcome) -> Self {
        if let StageOutcome::Degraded { reason } = &outcome {
            tracing::warn!(stage = ?stage, %reason, "Stage degraded");
        }
        Self { stage, outcome }
    }
}
