//! Outbound session events.
//!
//! Serialized as `{"event": "<name>", "payload": {...}}` so the transport can
//! forward them verbatim.

use crate::anomaly::{AnomalyCategory, Severity};
use crate::core::{AnomalyId, SessionId, SessionSnapshot, SessionStatus};
use crate::engine::state::Subsystem;
use crate::scoring::Score;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyDetected {
    pub id: AnomalyId,
    #[serde(rename = "type")]
    pub anomaly_type: String,
    pub name: String,
    pub category: AnomalyCategory,
    pub severity: Severity,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub recoverable: bool,
    pub recommended_action: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResolved {
    pub anomaly_id: AnomalyId,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: String,
    /// Milliseconds from detection to resolution.
    pub time_to_resolve: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyExpired {
    pub anomaly_id: AnomalyId,
    pub severity: Severity,
    pub description: String,
    pub consequence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub requires_action: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub subsystem: Subsystem,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlocked {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub session_id: SessionId,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCompleted {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub score: Score,
}

/// Every event a session can push to its transport room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum SessionEvent {
    #[serde(rename = "anomaly:detected")]
    AnomalyDetected(AnomalyDetected),
    #[serde(rename = "anomaly:resolved")]
    AnomalyResolved(AnomalyResolved),
    #[serde(rename = "anomaly:expired")]
    AnomalyExpired(AnomalyExpired),
    #[serde(rename = "alert:critical")]
    CriticalAlert(CriticalAlert),
    #[serde(rename = "alert:limit")]
    LimitAlert(LimitAlert),
    #[serde(rename = "achievement:unlocked")]
    AchievementUnlocked(AchievementUnlocked),
    #[serde(rename = "telemetry:update")]
    Telemetry(Box<SessionSnapshot>),
    #[serde(rename = "session:status")]
    StatusChanged(StatusChanged),
    #[serde(rename = "session:completed")]
    Completed(Box<SessionCompleted>),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AnomalyDetected(_) => "anomaly:detected",
            Self::AnomalyResolved(_) => "anomaly:resolved",
            Self::AnomalyExpired(_) => "anomaly:expired",
            Self::CriticalAlert(_) => "alert:critical",
            Self::LimitAlert(_) => "alert:limit",
            Self::AchievementUnlocked(_) => "achievement:unlocked",
            Self::Telemetry(_) => "telemetry:update",
            Self::StatusChanged(_) => "session:status",
            Self::Completed(_) => "session:completed",
        }
    }
}
