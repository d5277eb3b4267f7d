//! Persistence boundary.
//!
//! The simulator needs three things from storage: load a session seed by id,
//! append command history, and persist periodic snapshots. Snapshots are
//! version-guarded so a delayed writer can never overwrite newer state.

use crate::core::{CommandRecord, SessionId, SessionSeed, SessionSnapshot};
use crate::error::{SimError, SimResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn register_session(&self, seed: SessionSeed) -> SimResult<()>;

    async fn load_session(&self, session_id: &SessionId) -> SimResult<SessionSeed>;

    async fn append_command(&self, session_id: &SessionId, record: CommandRecord) -> SimResult<()>;

    /// Fails with `StaleVersion` if a newer snapshot is already stored.
    async fn save_snapshot(&self, session_id: &SessionId, snapshot: &SessionSnapshot) -> SimResult<()>;

    async fn load_snapshot(&self, session_id: &SessionId) -> SimResult<Option<SessionSnapshot>>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    seed: SessionSeed,
    commands: Vec<CommandRecord>,
    snapshot: Option<SessionSnapshot>,
}

/// Volatile store used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, StoredSession>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn commands(&self, session_id: &SessionId) -> Vec<CommandRecord> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn register_session(&self, seed: SessionSeed) -> SimResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&seed.session_id) {
            return Err(SimError::SessionAlreadyActive(seed.session_id));
        }
        sessions.insert(
            seed.session_id.clone(),
            StoredSession {
                seed,
                commands: Vec::new(),
                snapshot: None,
            },
        );
        Ok(())
    }

    async fn load_session(&self, session_id: &SessionId) -> SimResult<SessionSeed> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.seed.clone())
            .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))
    }

    async fn append_command(&self, session_id: &SessionId, record: CommandRecord) -> SimResult<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))?;
        stored.commands.push(record);
        Ok(())
    }

    async fn save_snapshot(&self, session_id: &SessionId, snapshot: &SessionSnapshot) -> SimResult<()> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(session_id)
            .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))?;

        if let Some(previous) = &stored.snapshot {
            if previous.version > snapshot.version {
                return Err(SimError::StaleVersion {
                    session_id: session_id.clone(),
                    stored: previous.version,
                    attempted: snapshot.version,
                });
            }
        }
        stored.snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, session_id: &SessionId) -> SimResult<Option<SessionSnapshot>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|s| s.snapshot.clone())
            .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::core::Difficulty;
    use crate::engine::SimulationEngine;
    use crate::scenarios::create_scenario;

    pub(crate) fn seed(id: &str) -> SessionSeed {
        SessionSeed::new(
            id.to_string(),
            "u-1".to_string(),
            Difficulty::Beginner,
            create_scenario("leo-orbit-raise").unwrap(),
        )
    }

    pub(crate) fn snapshot(id: &str, version: u64) -> SessionSnapshot {
        let engine = SimulationEngine::new(seed(id), &SimConfig::default()).unwrap();
        let mut snapshot = engine.snapshot(&[]);
        snapshot.version = version;
        snapshot
    }

    #[tokio::test]
    async fn test_register_and_load() {
        let store = MemoryStore::new();
        store.register_session(seed("s-1")).await.unwrap();

        let loaded = store.load_session(&"s-1".to_string()).await.unwrap();
        assert_eq!(loaded.scenario.id, "leo-orbit-raise");
        assert!(matches!(
            store.load_session(&"nope".to_string()).await,
            Err(SimError::SessionNotFound(_))
        ));
        assert!(store.register_session(seed("s-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_stale_snapshots_are_rejected() {
        let store = MemoryStore::new();
        let id = "s-1".to_string();
        store.register_session(seed("s-1")).await.unwrap();

        store.save_snapshot(&id, &snapshot("s-1", 5)).await.unwrap();
        store.save_snapshot(&id, &snapshot("s-1", 5)).await.unwrap();
        let err = store.save_snapshot(&id, &snapshot("s-1", 3)).await.unwrap_err();
        assert_eq!(
            err,
            SimError::StaleVersion {
                session_id: id.clone(),
                stored: 5,
                attempted: 3
            }
        );

        store.save_snapshot(&id, &snapshot("s-1", 9)).await.unwrap();
        let latest = store.load_snapshot(&id).await.unwrap().unwrap();
        assert_eq!(latest.version, 9);
    }

    #[tokio::test]
    async fn test_append_requires_known_session() {
        let store = MemoryStore::new();
        let record = CommandRecord {
            sequence: 1,
            command: "ARM_PROPULSION".into(),
            payload: serde_json::Value::Null,
            status: crate::core::CommandStatus::Ok,
            message: "propulsion armed".into(),
            issued_at: chrono::Utc::now(),
            sim_time_ms: 0,
            resolved: Vec::new(),
        };
        assert!(store.append_command(&"x".to_string(), record.clone()).await.is_err());

        store.register_session(seed("x")).await.unwrap();
        store.append_command(&"x".to_string(), record).await.unwrap();
        assert_eq!(store.commands(&"x".to_string()).await.len(), 1);
    }
}
