//! Session actor.
//!
//! One tokio task per live session. The task owns the `SimulationEngine` and
//! its `AnomalyInjector` outright, so commands, ticks and timer firings are
//! applied one at a time without locks:
//!
//! ```text
//!   SessionManager ──► mailbox ─┐
//!   TokioTimers    ──► timers  ─┤
//!   tick interval  ─────────────┼──► select! ──► engine / injector
//!   telemetry interval ─────────┤                    │
//!   snapshot interval ──────────┘                    ▼
//!                                            Transport::emit(room)
//! ```
//!
//! A terminal status stops injection, persists a final snapshot, announces
//! completion and ends the task.

use crate::anomaly::{AnomalyInjector, AnomalyKind, AnomalyState, AnomalyStats, TimerEvent};
use crate::config::SimConfig;
use crate::core::{SessionId, SessionSnapshot, SessionStatus};
use crate::engine::{CommandOutcome, SimulationEngine};
use crate::error::SimResult;
use crate::events::{SessionCompleted, SessionEvent, StatusChanged};
use crate::metrics;
use crate::scoring::Score;
use crate::store::SessionStore;
use crate::transport::Transport;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<T>;

/// Requests a session actor accepts.
pub(crate) enum SessionMsg {
    Start(Reply<SimResult<SessionStatus>>),
    Command {
        name: String,
        payload: Value,
        reply: Reply<SimResult<CommandOutcome>>,
    },
    Pause(Reply<SimResult<SessionStatus>>),
    Resume(Reply<SimResult<SessionStatus>>),
    Terminate(Reply<SimResult<Score>>),
    Snapshot(Reply<SessionSnapshot>),
    Score(Reply<Score>),
    ActiveAnomalies(Reply<Vec<AnomalyState>>),
    Stats(Reply<AnomalyStats>),
    Inject {
        kind: AnomalyKind,
        reply: Reply<SimResult<AnomalyState>>,
    },
}

/// Posted to the manager when an actor ends on its own.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lifecycle {
    Finished {
        session_id: SessionId,
        status: SessionStatus,
    },
}

pub(crate) struct SessionActor {
    pub(crate) engine: SimulationEngine,
    pub(crate) injector: AnomalyInjector,
    pub(crate) inbox: mpsc::Receiver<SessionMsg>,
    pub(crate) timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) lifecycle: mpsc::UnboundedSender<Lifecycle>,
    pub(crate) cancel: CancellationToken,
    pub(crate) config: SimConfig,
}

impl SessionActor {
    fn session_id(&self) -> &SessionId {
        &self.engine.session().id
    }

    pub(crate) async fn run(mut self) {
        let period = self.config.tick_interval();
        let mut tick = tokio::time::interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let telemetry_period = self.config.telemetry_interval();
        let mut telemetry = tokio::time::interval_at(Instant::now() + telemetry_period, telemetry_period);
        telemetry.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let snapshot_period = self.config.snapshot_interval();
        let mut snapshots = tokio::time::interval_at(Instant::now() + snapshot_period, snapshot_period);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_tick = Instant::now();
        debug!(session_id = %self.session_id(), "session actor running");

        loop {
            let mut events = Vec::new();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                    break;
                }

                msg = self.inbox.recv() => match msg {
                    Some(msg) => self.handle(msg, &mut events).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },

                Some(timer) = self.timer_rx.recv() => {
                    self.injector.handle_timer(timer, &mut self.engine, &mut events);
                }

                now = tick.tick() => {
                    let elapsed = now.saturating_duration_since(last_tick);
                    last_tick = now;
                    if self.engine.status() == SessionStatus::InProgress {
                        let timer = metrics::TICK_LATENCY.start_timer();
                        if let Err(e) = self.engine.tick(elapsed.as_millis() as u64, &mut events) {
                            warn!(session_id = %self.session_id(), error = %e, "tick rejected");
                        }
                        timer.observe_duration();
                    }
                }

                _ = telemetry.tick() => {
                    if matches!(self.engine.status(), SessionStatus::InProgress | SessionStatus::Paused) {
                        let snapshot = self.engine.snapshot(self.injector.active_anomalies());
                        events.push(SessionEvent::Telemetry(Box::new(snapshot)));
                    }
                }

                _ = snapshots.tick() => {
                    self.persist_snapshot().await;
                }
            }

            self.emit_all(events);

            if self.engine.status().is_terminal() {
                self.finish().await;
                break;
            }
        }

        debug!(session_id = %self.session_id(), "session actor stopped");
    }

    async fn handle(&mut self, msg: SessionMsg, events: &mut Vec<SessionEvent>) {
        match msg {
            SessionMsg::Start(reply) => {
                let result = self.engine.start();
                if result.is_ok() {
                    self.injector.start_injection(self.engine.session().difficulty);
                    self.status_event(events, None);
                }
                let _ = reply.send(result.map(|_| self.engine.status()));
            }
            SessionMsg::Command {
                name,
                payload,
                reply,
            } => {
                let outcome = self
                    .engine
                    .apply_command(&mut self.injector, &name, &payload, events);
                if outcome.is_ok() {
                    self.append_history().await;
                }
                let _ = reply.send(outcome);
            }
            SessionMsg::Pause(reply) => {
                let result = self.engine.pause();
                if result.is_ok() {
                    self.status_event(events, None);
                }
                let _ = reply.send(result.map(|_| self.engine.status()));
            }
            SessionMsg::Resume(reply) => {
                let result = self.engine.resume();
                if result.is_ok() {
                    self.status_event(events, None);
                }
                let _ = reply.send(result.map(|_| self.engine.status()));
            }
            SessionMsg::Terminate(reply) => {
                let result = self.engine.abandon().map(|_| self.engine.score());
                let _ = reply.send(result);
            }
            SessionMsg::Snapshot(reply) => {
                let _ = reply.send(self.engine.snapshot(self.injector.active_anomalies()));
            }
            SessionMsg::Score(reply) => {
                let _ = reply.send(self.engine.score());
            }
            SessionMsg::ActiveAnomalies(reply) => {
                let _ = reply.send(self.injector.active_anomalies().to_vec());
            }
            SessionMsg::Stats(reply) => {
                let _ = reply.send(self.injector.stats());
            }
            SessionMsg::Inject { kind, reply } => {
                let _ = reply.send(self.injector.inject(kind, &mut self.engine, events));
            }
        }
    }

    fn status_event(&self, events: &mut Vec<SessionEvent>, reason: Option<String>) {
        events.push(SessionEvent::StatusChanged(StatusChanged {
            session_id: self.session_id().clone(),
            status: self.engine.status(),
            reason,
        }));
    }

    fn emit_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.transport.emit(self.session_id(), event);
        }
    }

    async fn append_history(&self) {
        let Some(record) = self.engine.session().history.last().cloned() else {
            return;
        };
        if let Err(e) = self.store.append_command(self.session_id(), record).await {
            warn!(session_id = %self.session_id(), error = %e, "failed to persist command");
        }
    }

    async fn persist_snapshot(&self) {
        let snapshot = self.engine.snapshot(self.injector.active_anomalies());
        if let Err(e) = self.store.save_snapshot(self.session_id(), &snapshot).await {
            metrics::SNAPSHOT_FAILURES.inc();
            warn!(session_id = %self.session_id(), error = %e, "snapshot not saved");
        }
    }

    /// Terminal status reached: stop timers, persist, announce.
    async fn finish(&mut self) {
        let ended = self.injector.stop_injection();
        self.persist_snapshot().await;

        let status = self.engine.status();
        let score = self.engine.score();
        let session_id = self.session_id().clone();

        self.emit_all(vec![
            SessionEvent::StatusChanged(StatusChanged {
                session_id: session_id.clone(),
                status,
                reason: self.engine.session().failure_reason.clone(),
            }),
            SessionEvent::Completed(Box::new(SessionCompleted {
                session_id: session_id.clone(),
                status,
                score: score.clone(),
            })),
        ]);

        metrics::SESSIONS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
        info!(
            %session_id,
            status = ?status,
            total = score.total,
            open_anomalies = ended.len(),
            "session closed"
        );

        let _ = self.lifecycle.send(Lifecycle::Finished { session_id, status });
    }

    /// Cancelled from outside: stop timers and keep the latest state.
    async fn shutdown(&mut self) {
        self.injector.stop_injection();
        self.persist_snapshot().await;
        debug!(session_id = %self.session_id(), "session actor shut down");
    }
}
