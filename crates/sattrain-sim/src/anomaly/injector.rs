//! Anomaly Injector
//!
//! Per-session fault scheduler. Owned by the session actor together with the
//! `SimulationEngine`, so checks, expiries and command-driven resolution all
//! run inside the same serialization boundary.
//!
//! ```text
//!   TimerEvent::Check ──► on_check ──► roll ──► choose eligible ──► inject
//!                                                                    │
//!               ┌─────────────── apply effects, schedule expiry ◄────┘
//!               ▼
//!   command ──► resolve_matching ──► remove effects, cancel expiry
//!   TimerEvent::Expire ──► on_expiry ──► remove effects (+ escalate if critical)
//! ```

use crate::anomaly::policy::InjectionPolicy;
use crate::anomaly::timers::{InjectionTimers, TimerEvent};
use crate::anomaly::{
    AnomalyDefinition, AnomalyKind, AnomalyResolution, AnomalyState, ResolutionCause, Severity,
    CATALOG,
};
use crate::core::{AnomalyId, Difficulty, SessionId, SessionStatus};
use crate::engine::command::CommandKind;
use crate::error::{SimError, SimResult};
use crate::events::{AnomalyDetected, AnomalyExpired, AnomalyResolved, CriticalAlert, SessionEvent};
use crate::metrics;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Retry delay for expiries that fire while the session is paused.
pub const PAUSED_EXPIRY_RETRY: Duration = Duration::from_secs(5);

/// The simulator-side hooks the injector drives.
///
/// Implemented by `SimulationEngine`; tests use a recording fake.
pub trait AnomalyTarget {
    fn status(&self) -> SessionStatus;

    fn apply_anomaly_effects(&mut self, definition: &AnomalyDefinition);

    fn remove_anomaly_effects(&mut self, definition: &AnomalyDefinition);

    /// Called once per anomaly when it leaves the active set by command or
    /// expiry.
    fn record_anomaly_outcome(&mut self, anomaly: &AnomalyState);
}

/// Injection counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyStats {
    pub checks: u64,
    pub injected: u64,
    pub resolved: u64,
    pub expired: u64,
    /// Critical expiries that raised an `alert:critical`.
    pub escalated: u64,
    pub skipped_at_cap: u64,
    pub skipped_no_eligible: u64,
    pub skipped_inactive: u64,
    pub deferred_expiries: u64,
    pub active: usize,
}

pub struct AnomalyInjector {
    session_id: SessionId,
    policy: InjectionPolicy,
    active: Vec<AnomalyState>,
    stats: AnomalyStats,
    rng: StdRng,
    timers: Box<dyn InjectionTimers>,
    running: bool,
}

impl AnomalyInjector {
    pub fn new(session_id: SessionId, seed: Option<u64>, timers: Box<dyn InjectionTimers>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };

        Self {
            session_id,
            policy: InjectionPolicy::for_difficulty(Difficulty::Beginner),
            active: Vec::new(),
            stats: AnomalyStats::default(),
            rng,
            timers,
            running: false,
        }
    }

    /// Begin recurring checks using the policy for `difficulty`.
    pub fn start_injection(&mut self, difficulty: Difficulty) {
        self.start_with_policy(InjectionPolicy::for_difficulty(difficulty));
    }

    pub fn start_with_policy(&mut self, policy: InjectionPolicy) {
        self.timers.cancel_all();
        self.active.clear();
        if policy.enabled {
            self.timers.start_checks(policy.check_interval());
        }
        debug!(
            session_id = %self.session_id,
            enabled = policy.enabled,
            probability = policy.probability,
            max_concurrent = policy.max_concurrent,
            "anomaly injection started"
        );
        self.policy = policy;
        self.running = true;
    }

    /// Dispatch a fired timer.
    pub fn handle_timer<T: AnomalyTarget>(
        &mut self,
        event: TimerEvent,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) {
        match event {
            TimerEvent::Check => {
                self.on_check(target, events);
            }
            TimerEvent::Expire(id) => {
                self.on_expiry(&id, target, events);
            }
        }
    }

    /// One recurring injection check. Returns the injected anomaly, if any.
    pub fn on_check<T: AnomalyTarget>(
        &mut self,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> Option<AnomalyState> {
        if !self.running || !self.policy.enabled {
            return None;
        }
        self.stats.checks += 1;

        if target.status() != SessionStatus::InProgress {
            self.stats.skipped_inactive += 1;
            return None;
        }

        if self.active.len() >= self.policy.max_concurrent {
            self.stats.skipped_at_cap += 1;
            trace!(session_id = %self.session_id, "anomaly check skipped at cap");
            return None;
        }

        let roll: f64 = self.rng.random();
        if roll >= self.policy.probability {
            return None;
        }

        let eligible: Vec<&'static AnomalyDefinition> = CATALOG
            .iter()
            .filter(|d| self.policy.allows(d) && !self.is_active(d.kind))
            .collect();

        let Some(definition) = eligible.choose(&mut self.rng).copied() else {
            self.stats.skipped_no_eligible += 1;
            return None;
        };

        Some(self.inject_definition(definition, target, events))
    }

    /// Inject a specific fault on demand (instructor tooling).
    ///
    /// Bypasses the probability roll and category filter but still honours
    /// the one-per-type rule and the concurrency cap.
    pub fn inject<T: AnomalyTarget>(
        &mut self,
        kind: AnomalyKind,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> SimResult<AnomalyState> {
        if !self.running {
            return Err(SimError::AnomalyRejected("injection is not running".into()));
        }
        if target.status() != SessionStatus::InProgress {
            return Err(SimError::AnomalyRejected(format!(
                "session is {:?}",
                target.status()
            )));
        }
        if self.is_active(kind) {
            return Err(SimError::AnomalyRejected(format!("{} is already active", kind)));
        }
        if self.active.len() >= self.policy.max_concurrent {
            return Err(SimError::AnomalyRejected(format!(
                "concurrency cap of {} reached",
                self.policy.max_concurrent
            )));
        }

        Ok(self.inject_definition(kind.definition(), target, events))
    }

    fn inject_definition<T: AnomalyTarget>(
        &mut self,
        definition: &'static AnomalyDefinition,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> AnomalyState {
        let now = Utc::now();
        let ttl_ms = i64::try_from(definition.ttl.as_millis()).unwrap_or(i64::MAX);
        let anomaly = AnomalyState {
            id: Uuid::new_v4().to_string(),
            kind: definition.kind,
            category: definition.category,
            severity: definition.severity,
            injected_at: now,
            expires_at: now + chrono::Duration::milliseconds(ttl_ms),
            active: true,
            resolution: None,
        };

        target.apply_anomaly_effects(definition);
        self.timers.schedule_expiry(&anomaly.id, definition.ttl);
        self.active.push(anomaly.clone());
        self.stats.injected += 1;
        metrics::ANOMALIES_INJECTED
            .with_label_values(&[definition.kind.as_str()])
            .inc();

        info!(
            session_id = %self.session_id,
            anomaly_id = %anomaly.id,
            kind = %definition.kind,
            severity = ?definition.severity,
            "anomaly injected"
        );

        events.push(SessionEvent::AnomalyDetected(AnomalyDetected {
            id: anomaly.id.clone(),
            anomaly_type: definition.kind.as_str().to_string(),
            name: definition.name.to_string(),
            category: definition.category,
            severity: definition.severity,
            description: definition.description.to_string(),
            detected_at: anomaly.injected_at,
            expires_at: anomaly.expires_at,
            recoverable: definition.recoverable,
            recommended_action: definition.recommended_action.to_string(),
        }));

        anomaly
    }

    /// Resolve every active fault whose corrective command is `command`.
    ///
    /// Returns whether anything was resolved; a second call for the same
    /// command is a no-op.
    pub fn resolve_anomaly<T: AnomalyTarget>(
        &mut self,
        command: CommandKind,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> bool {
        !self.resolve_matching(command, target, events).is_empty()
    }

    /// Like `resolve_anomaly`, returning the resolved anomalies in
    /// injection order.
    pub fn resolve_matching<T: AnomalyTarget>(
        &mut self,
        command: CommandKind,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> Vec<AnomalyState> {
        let (matched, remaining): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|a| a.active && a.definition().corrective == command);
        self.active = remaining;

        let now = Utc::now();
        let mut resolved = Vec::with_capacity(matched.len());
        for mut anomaly in matched {
            let definition = anomaly.definition();
            self.timers.cancel_expiry(&anomaly.id);
            target.remove_anomaly_effects(definition);

            anomaly.active = false;
            anomaly.resolution = Some(AnomalyResolution {
                at: now,
                cause: ResolutionCause::Command { command },
            });
            target.record_anomaly_outcome(&anomaly);
            self.stats.resolved += 1;
            metrics::ANOMALIES_RESOLVED
                .with_label_values(&[definition.kind.as_str()])
                .inc();

            let time_to_resolve = (now - anomaly.injected_at).num_milliseconds().max(0);
            info!(
                session_id = %self.session_id,
                anomaly_id = %anomaly.id,
                kind = %definition.kind,
                time_to_resolve_ms = time_to_resolve,
                "anomaly resolved"
            );
            events.push(SessionEvent::AnomalyResolved(AnomalyResolved {
                anomaly_id: anomaly.id.clone(),
                resolved_at: now,
                resolved_by: command.as_str().to_string(),
                time_to_resolve,
            }));
            resolved.push(anomaly);
        }
        resolved
    }

    /// Expire an anomaly whose TTL elapsed. Stale ids are ignored.
    ///
    /// While the session is paused the deadline is pushed back instead, so
    /// paused time never counts against the operator.
    pub fn on_expiry<T: AnomalyTarget>(
        &mut self,
        anomaly_id: &AnomalyId,
        target: &mut T,
        events: &mut Vec<SessionEvent>,
    ) -> bool {
        let Some(index) = self.active.iter().position(|a| &a.id == anomaly_id && a.active) else {
            trace!(session_id = %self.session_id, %anomaly_id, "ignoring stale expiry");
            return false;
        };

        if target.status() == SessionStatus::Paused {
            self.stats.deferred_expiries += 1;
            self.active[index].expires_at = Utc::now()
                + chrono::Duration::milliseconds(PAUSED_EXPIRY_RETRY.as_millis() as i64);
            self.timers.schedule_expiry(anomaly_id, PAUSED_EXPIRY_RETRY);
            return false;
        }

        let mut anomaly = self.active.remove(index);
        let definition = anomaly.definition();
        self.timers.cancel_expiry(anomaly_id);
        target.remove_anomaly_effects(definition);

        anomaly.active = false;
        anomaly.resolution = Some(AnomalyResolution {
            at: Utc::now(),
            cause: ResolutionCause::Expired,
        });
        target.record_anomaly_outcome(&anomaly);
        self.stats.expired += 1;
        metrics::ANOMALIES_EXPIRED
            .with_label_values(&[definition.kind.as_str()])
            .inc();

        warn!(
            session_id = %self.session_id,
            anomaly_id = %anomaly.id,
            kind = %definition.kind,
            severity = ?definition.severity,
            "anomaly expired unresolved"
        );

        events.push(SessionEvent::AnomalyExpired(AnomalyExpired {
            anomaly_id: anomaly.id.clone(),
            severity: definition.severity,
            description: definition.description.to_string(),
            consequence: definition.consequence.to_string(),
        }));

        if definition.severity == Severity::Critical {
            self.stats.escalated += 1;
            events.push(SessionEvent::CriticalAlert(CriticalAlert {
                alert_type: "anomaly_unresolved".to_string(),
                title: format!("{} unresolved", definition.name),
                message: format!(
                    "{}. {}",
                    definition.consequence, definition.recommended_action
                ),
                severity: Severity::Critical,
                requires_action: definition.recoverable,
            }));
        }

        true
    }

    /// Cancel every timer and clear the active set. Safe to call repeatedly.
    ///
    /// Returns the anomalies that were still active, marked as ended with
    /// the session. Their effects are left in place.
    pub fn stop_injection(&mut self) -> Vec<AnomalyState> {
        self.timers.cancel_all();
        let was_running = std::mem::replace(&mut self.running, false);

        let now = Utc::now();
        let ended: Vec<AnomalyState> = self
            .active
            .drain(..)
            .map(|mut a| {
                a.active = false;
                a.resolution = Some(AnomalyResolution {
                    at: now,
                    cause: ResolutionCause::SessionEnded,
                });
                a
            })
            .collect();

        if was_running {
            debug!(
                session_id = %self.session_id,
                dropped = ended.len(),
                "anomaly injection stopped"
            );
        }
        ended
    }

    pub fn active_anomalies(&self) -> &[AnomalyState] {
        &self.active
    }

    pub fn is_active(&self, kind: AnomalyKind) -> bool {
        self.active.iter().any(|a| a.kind == kind && a.active)
    }

    pub fn stats(&self) -> AnomalyStats {
        AnomalyStats {
            active: self.active.len(),
            ..self.stats.clone()
        }
    }

    pub fn policy(&self) -> &InjectionPolicy {
        &self.policy
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }
}

impl Drop for AnomalyInjector {
    fn drop(&mut self) {
        self.timers.cancel_all();
    }
}
