//! Error taxonomy for the simulation core.
//!
//! Only `SessionNotFound`, `InvalidSessionState` and the ownership/lifecycle
//! variants ever cross the `SessionManager` boundary. Command validation
//! failures are folded into an `ERROR` command result before they reach the
//! transport, and achievement predicate failures are logged and skipped.

use crate::core::{SessionId, SessionStatus};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {session_id} is {status:?}; operation requires {required:?}")]
    InvalidSessionState {
        session_id: SessionId,
        status: SessionStatus,
        required: SessionStatus,
    },

    #[error("invalid command: {0}")]
    CommandValidation(String),

    #[error("achievement '{id}' check failed: {reason}")]
    AchievementCheck { id: &'static str, reason: String },

    #[error("user {caller} does not own session {session_id}")]
    NotSessionOwner { session_id: SessionId, caller: String },

    #[error("session already active: {0}")]
    SessionAlreadyActive(SessionId),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("anomaly rejected: {0}")]
    AnomalyRejected(String),

    #[error("scoring weights must sum to 1.0 (got {0:.4})")]
    InvalidWeights(f64),

    #[error("stale snapshot for {session_id}: stored version {stored}, attempted {attempted}")]
    StaleVersion {
        session_id: SessionId,
        stored: u64,
        attempted: u64,
    },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("session manager is shut down")]
    ShutDown,
}

impl SimError {
    /// Shorthand for the command-validation variant.
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::CommandValidation(msg.into())
    }
}

pub type SimResult<T> = Result<T, SimError>;
