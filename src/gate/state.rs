//! Artifact state machine
//!
//! ABSENT → GENERATING → VALID → (EXPIRING | PARAM_MISMATCH | DRIFTED) → GENERATING → ...
//!
//! A run ends in VALID (nothing to do) or REGENERATED.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed or in-flight state of one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    /// No fingerprint recorded
    Absent,
    /// Fingerprint matches the request and has enough validity left
    Valid,
    /// Remaining validity below the threshold
    Expiring,
    /// Recorded strength differs from the requested one
    ParamMismatch,
    /// Artifact file missing or modified since it was recorded
    Drifted,
    /// Steps running
    Generating,
    /// Steps finished and fingerprint persisted
    Regenerated,
}

impl ArtifactState {
    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: ArtifactState) -> bool {
        match (self, target) {
            // Any observed state may be regenerated (VALID only when forced)
            (ArtifactState::Absent, ArtifactState::Generating) => true,
            (ArtifactState::Valid, ArtifactState::Generating) => true,
            (ArtifactState::Expiring, ArtifactState::Generating) => true,
            (ArtifactState::ParamMismatch, ArtifactState::Generating) => true,
            (ArtifactState::Drifted, ArtifactState::Generating) => true,

            (ArtifactState::Generating, ArtifactState::Regenerated) => true,

            _ => false,
        }
    }

    /// True for the two states a run can end in
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactState::Valid | ArtifactState::Regenerated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::Absent => "ABSENT",
            ArtifactState::Valid => "VALID",
            ArtifactState::Expiring => "EXPIRING",
            ArtifactState::ParamMismatch => "PARAM_MISMATCH",
            ArtifactState::Drifted => "DRIFTED",
            ArtifactState::Generating => "GENERATING",
            ArtifactState::Regenerated => "REGENERATED",
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Skip,
    Regenerate,
}

/// Outcome of a regeneration decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Artifact identifier
    pub identifier: String,

    /// State derived from the stored fingerprint
    pub state: ArtifactState,

    /// Resulting action
    pub action: Action,

    /// Whether `force` overrode the state
    pub forced: bool,

    /// Whole days of validity left, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_days: Option<i64>,

    /// Strength found in the fingerprint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_strength: Option<u32>,

    /// Strength asked for
    pub requested_strength: u32,
}

impl Decision {
    pub fn must_regenerate(&self) -> bool {
        self.action == Action::Regenerate
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// One-line summary for terminals
    pub fn to_human(&self) -> String {
        let action = match self.action {
            Action::Skip => "skip",
            Action::Regenerate => "regenerate",
        };
        let mut line = format!("{}: {} ({})", self.identifier, action, self.state);
        if self.forced {
            line.push_str(", forced");
        }
        if let Some(days) = self.remaining_days {
            line.push_str(&format!(", {} days remaining", days));
        }
        line
    }
}
