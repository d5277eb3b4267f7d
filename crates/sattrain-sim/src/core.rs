//! Core Types for sattrain-sim
//!
//! Session, metrics and command-history types shared by the engine, the
//! anomaly injector, scoring and the session manager. Wire-facing types
//! serialize as camelCase.

use crate::anomaly::AnomalyState;
use crate::engine::state::SpacecraftState;
use crate::scenarios::ScenarioDefinition;
use crate::scoring::Score;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SessionId = String;
pub type UserId = String;
pub type AnomalyId = String;

// ============================================================================
// Lifecycle
// ============================================================================

/// Session lifecycle status.
///
/// `NOT_STARTED → IN_PROGRESS ⇄ PAUSED → {COMPLETED | FAILED | ABANDONED}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Failed,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Abandoned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Abandoned => "ABANDONED",
        }
    }
}

/// Difficulty tier; selects the anomaly injection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

// ============================================================================
// Metrics
// ============================================================================

/// One timing observation: when the operator acted versus the planned time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingSample {
    pub actual_s: f64,
    pub optimal_s: f64,
    pub window_s: f64,
}

impl TimingSample {
    pub fn error_s(&self) -> f64 {
        (self.actual_s - self.optimal_s).abs()
    }
}

/// One executed burn with its accuracy against the step plan (if any).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnRecord {
    pub delta_v_ms: f64,
    pub planned_delta_v_ms: Option<f64>,
    /// 1.0 is a perfect burn. `None` when no plan existed.
    pub accuracy: Option<f64>,
    pub sim_time_s: f64,
}

/// Cumulative per-session metrics; the sole input to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub steps_completed: u32,
    pub total_steps: u32,
    pub hints_used: u32,
    pub errors: u32,
    pub delta_v_used_ms: f64,
    pub delta_v_budget_ms: f64,
    /// Safety violations: limit alerts plus expired anomalies.
    pub alerts_triggered: u32,
    pub critical_alerts: u32,
    pub timing_samples: Vec<TimingSample>,
    pub burns: Vec<BurnRecord>,
    pub anomalies_resolved: u32,
    pub anomalies_expired: u32,
    pub elapsed_s: f64,
    pub estimated_duration_s: f64,
    pub eccentricity: f64,
    pub completed: bool,
}

// ============================================================================
// Commands
// ============================================================================

/// Outcome class of an applied command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "NO_EFFECT")]
    NoEffect,
}

impl CommandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::NoEffect => "NO_EFFECT",
        }
    }
}

/// Acknowledgement returned to the operator for every command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_delta: Option<i32>,
}

impl CommandResult {
    pub fn new(status: CommandStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            score_delta: None,
        }
    }
}

/// Command history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub sequence: u64,
    pub command: String,
    pub payload: serde_json::Value,
    pub status: CommandStatus,
    pub message: String,
    pub issued_at: DateTime<Utc>,
    pub sim_time_ms: u64,
    /// Anomaly types resolved as a side effect of this command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolved: Vec<String>,
}

// ============================================================================
// Session
// ============================================================================

/// Ordered step progress through a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StepProgress {
    pub current_step: usize,
    pub completed_steps: Vec<String>,
    pub step_order: Vec<String>,
}

impl StepProgress {
    pub fn is_finished(&self) -> bool {
        self.current_step >= self.step_order.len()
    }
}

/// Everything needed to start a session; loaded from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSeed {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub difficulty: Difficulty,
    pub scenario: ScenarioDefinition,
    pub created_at: DateTime<Utc>,
}

impl SessionSeed {
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        difficulty: Difficulty,
        scenario: ScenarioDefinition,
    ) -> Self {
        Self {
            session_id,
            user_id,
            difficulty,
            scenario,
            created_at: Utc::now(),
        }
    }
}

/// Per-session state owned by exactly one `SimulationEngine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub scenario_id: String,
    pub difficulty: Difficulty,
    pub status: SessionStatus,
    pub state: SpacecraftState,
    pub progress: StepProgress,
    pub metrics: SessionMetrics,
    pub history: Vec<CommandRecord>,
    /// Bumped on every mutation.
    pub version: u64,
    pub sim_time_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Lightweight identity returned from lifecycle calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub scenario_id: String,
    pub difficulty: Difficulty,
    pub status: SessionStatus,
}

/// Point-in-time view of a session: telemetry payload and persistence unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub scenario_id: String,
    pub status: SessionStatus,
    pub version: u64,
    pub sim_time_ms: u64,
    pub state: SpacecraftState,
    pub progress: StepProgress,
    pub score: Score,
    pub active_anomalies: Vec<AnomalyState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Abandoned.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_command_result_wire_shape() {
        let mut result = CommandResult::new(CommandStatus::NoEffect, "already armed");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "NO_EFFECT");
        assert!(json.get("scoreDelta").is_none());

        result.score_delta = Some(3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["scoreDelta"], 3);
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&SessionStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
    }
}
