//! Session Manager
//!
//! Registry of live sessions. Each session runs as an actor task
//! (see [`actor`]); the manager only holds its mailbox and owner:
//!
//! ```text
//!   create_session ──► store.register ──► open_session ──► spawn actor
//!                                                              │
//!   route_command(session, user) ── owner check ──► mailbox ───┤
//!                                                              │
//!   reaper ◄── Lifecycle::Finished ◄───────────────────────────┘
//!     └─ drop handle, leave room
//! ```
//!
//! Ended sessions are removed by the reaper, so the registry only ever
//! holds sessions that can still accept work.

pub(crate) mod actor;

use crate::anomaly::{AnomalyInjector, AnomalyKind, AnomalyState, AnomalyStats, TokioTimers};
use crate::config::SimConfig;
use crate::core::{
    Difficulty, SessionId, SessionSeed, SessionSnapshot, SessionStatus, SessionSummary, UserId,
};
use crate::engine::{CommandOutcome, SimulationEngine};
use crate::error::{SimError, SimResult};
use crate::metrics;
use crate::scenarios::create_scenario;
use crate::scoring::Score;
use crate::store::SessionStore;
use crate::transport::Transport;
use actor::{Lifecycle, SessionActor, SessionMsg};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct SessionHandle {
    tx: mpsc::Sender<SessionMsg>,
    user_id: UserId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct SessionManager {
    config: SimConfig,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn Transport>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    lifecycle_tx: mpsc::UnboundedSender<Lifecycle>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(config: SimConfig, store: Arc<dyn SessionStore>, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            config,
            store,
            transport,
            sessions: RwLock::new(HashMap::new()),
            lifecycle_tx,
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(reap(
            Arc::downgrade(&manager),
            lifecycle_rx,
            manager.shutdown.clone(),
        ));
        manager
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register a new session and bring its simulator online.
    pub async fn create_session(
        &self,
        user_id: UserId,
        scenario_id: &str,
        difficulty: Option<Difficulty>,
    ) -> SimResult<SessionSummary> {
        self.ensure_open()?;
        let scenario =
            create_scenario(scenario_id).ok_or_else(|| SimError::UnknownScenario(scenario_id.to_string()))?;
        let difficulty = difficulty.unwrap_or(scenario.default_difficulty);

        let session_id = uuid::Uuid::new_v4().to_string();
        self.store
            .register_session(SessionSeed::new(session_id.clone(), user_id, difficulty, scenario))
            .await?;
        self.open_session(&session_id).await
    }

    /// Load a registered session from the store and spawn its actor.
    pub async fn open_session(&self, session_id: &SessionId) -> SimResult<SessionSummary> {
        self.ensure_open()?;
        let seed = self.store.load_session(session_id).await?;

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session_id) {
            return Err(SimError::SessionAlreadyActive(session_id.clone()));
        }

        let engine = SimulationEngine::new(seed, &self.config)?;
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let injector = AnomalyInjector::new(
            session_id.clone(),
            self.config.rng_seed,
            Box::new(TokioTimers::new(timer_tx)),
        );
        let (tx, inbox) = mpsc::channel(self.config.mailbox_capacity.max(1));
        let cancel = self.shutdown.child_token();

        let session = engine.session();
        let summary = SessionSummary {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            scenario_id: session.scenario_id.clone(),
            difficulty: session.difficulty,
            status: session.status,
        };

        self.transport.join(session_id);
        let actor = SessionActor {
            engine,
            injector,
            inbox,
            timer_rx,
            store: Arc::clone(&self.store),
            transport: Arc::clone(&self.transport),
            lifecycle: self.lifecycle_tx.clone(),
            cancel: cancel.clone(),
            config: self.config.clone(),
        };
        let task = tokio::spawn(actor.run());

        sessions.insert(
            session_id.clone(),
            SessionHandle {
                tx,
                user_id: summary.user_id.clone(),
                cancel,
                task,
            },
        );
        metrics::ACTIVE_SESSIONS.inc();
        info!(
            session_id = %summary.session_id,
            user_id = %summary.user_id,
            scenario = %summary.scenario_id,
            difficulty = ?summary.difficulty,
            "session opened"
        );
        Ok(summary)
    }

    pub async fn start_session(&self, session_id: &SessionId) -> SimResult<SessionStatus> {
        self.request(session_id, SessionMsg::Start).await?
    }

    pub async fn pause_session(&self, session_id: &SessionId) -> SimResult<SessionStatus> {
        self.request(session_id, SessionMsg::Pause).await?
    }

    pub async fn resume_session(&self, session_id: &SessionId) -> SimResult<SessionStatus> {
        self.request(session_id, SessionMsg::Resume).await?
    }

    /// Abandon a session. Returns the score at the moment it ended.
    pub async fn terminate_session(&self, session_id: &SessionId) -> SimResult<Score> {
        self.request(session_id, SessionMsg::Terminate).await?
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Route an operator command to the session it names.
    ///
    /// Fails with `NotSessionOwner` when `user_id` did not create the session.
    pub async fn route_command(
        &self,
        session_id: &SessionId,
        user_id: &str,
        name: &str,
        payload: Value,
    ) -> SimResult<CommandOutcome> {
        let tx = {
            let sessions = self.sessions.read().await;
            let handle = sessions
                .get(session_id)
                .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))?;
            if handle.user_id != user_id {
                return Err(SimError::NotSessionOwner {
                    session_id: session_id.clone(),
                    caller: user_id.to_string(),
                });
            }
            handle.tx.clone()
        };

        let (reply, rx) = oneshot::channel();
        let msg = SessionMsg::Command {
            name: name.to_string(),
            payload,
            reply,
        };
        if tx.send(msg).await.is_err() {
            return Err(SimError::SessionNotFound(session_id.clone()));
        }
        rx.await
            .map_err(|_| SimError::SessionNotFound(session_id.clone()))?
    }

    pub async fn inject_anomaly(&self, session_id: &SessionId, kind: AnomalyKind) -> SimResult<AnomalyState> {
        self.request(session_id, |reply| SessionMsg::Inject { kind, reply })
            .await?
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Latest snapshot. Ended sessions fall back to their persisted one.
    pub async fn snapshot(&self, session_id: &SessionId) -> SimResult<SessionSnapshot> {
        match self.request(session_id, SessionMsg::Snapshot).await {
            Ok(snapshot) => Ok(snapshot),
            Err(SimError::SessionNotFound(_)) => self
                .store
                .load_snapshot(session_id)
                .await?
                .ok_or_else(|| SimError::SessionNotFound(session_id.clone())),
            Err(e) => Err(e),
        }
    }

    /// Live score projection; ended sessions report their final score.
    pub async fn partial_score(&self, session_id: &SessionId) -> SimResult<Score> {
        match self.request(session_id, SessionMsg::Score).await {
            Err(SimError::SessionNotFound(_)) => Ok(self.snapshot(session_id).await?.score),
            other => other,
        }
    }

    /// Empty for unknown or ended sessions.
    pub async fn active_anomalies(&self, session_id: &SessionId) -> Vec<AnomalyState> {
        self.request(session_id, SessionMsg::ActiveAnomalies)
            .await
            .unwrap_or_default()
    }

    pub async fn anomaly_stats(&self, session_id: &SessionId) -> AnomalyStats {
        self.request(session_id, SessionMsg::Stats)
            .await
            .unwrap_or_default()
    }

    pub async fn owner_of(&self, session_id: &SessionId) -> Option<UserId> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).map(|h| h.user_id.clone())
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<_> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop every session actor and wait for each to persist its state.
    ///
    /// Idempotent. New sessions are refused afterwards.
    pub async fn stop_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<(SessionId, SessionHandle)> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().collect()
        };
        info!(sessions = drained.len(), "stopping all sessions");

        for (_, handle) in &drained {
            handle.cancel.cancel();
        }
        for (session_id, handle) in drained {
            if let Err(e) = handle.task.await {
                warn!(%session_id, error = %e, "session task ended abnormally");
            }
            self.transport.leave(&session_id);
            metrics::ACTIVE_SESSIONS.dec();
        }
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_open(&self) -> SimResult<()> {
        if self.is_closed() {
            return Err(SimError::ShutDown);
        }
        Ok(())
    }

    async fn request<T>(
        &self,
        session_id: &SessionId,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionMsg,
    ) -> SimResult<T> {
        let tx = {
            let sessions = self.sessions.read().await;
            sessions
                .get(session_id)
                .map(|h| h.tx.clone())
                .ok_or_else(|| SimError::SessionNotFound(session_id.clone()))?
        };

        let (reply, rx) = oneshot::channel();
        if tx.send(make(reply)).await.is_err() {
            return Err(SimError::SessionNotFound(session_id.clone()));
        }
        rx.await
            .map_err(|_| SimError::SessionNotFound(session_id.clone()))
    }

    async fn release(&self, session_id: &SessionId) {
        let removed = self.sessions.write().await.remove(session_id);
        if removed.is_some() {
            self.transport.leave(session_id);
            metrics::ACTIVE_SESSIONS.dec();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Drops the registry entry of every session whose actor finished.
async fn reap(
    manager: Weak<SessionManager>,
    mut rx: mpsc::UnboundedReceiver<Lifecycle>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => event,
        };
        let Some(Lifecycle::Finished { session_id, status }) = event else {
            break;
        };
        let Some(manager) = manager.upgrade() else {
            break;
        };
        manager.release(&session_id).await;
        debug!(%session_id, status = ?status, "session released");
    }
}
