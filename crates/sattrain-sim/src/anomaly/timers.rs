//! Cancellable injection timers.
//!
//! Timers never touch session state. They only post `TimerEvent`s back to the
//! owning session actor, which applies them inside its own serialization
//! boundary. Cancelling a timer guarantees it posts nothing afterwards; events
//! already queued are discarded by the injector because the anomaly they
//! reference is no longer active.

use crate::core::AnomalyId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Message posted by a fired timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    Check,
    Expire(AnomalyId),
}

/// Timer backend used by `AnomalyInjector`.
pub trait InjectionTimers: Send + Sync {
    /// Start (or restart) the recurring injection check.
    fn start_checks(&mut self, every: Duration);

    /// Schedule a one-shot expiry for an anomaly.
    fn schedule_expiry(&mut self, anomaly_id: &AnomalyId, after: Duration);

    fn cancel_expiry(&mut self, anomaly_id: &AnomalyId);

    /// Cancel the recurring check and every pending expiry.
    fn cancel_all(&mut self);

    /// Number of live timers (recurring check counts as one).
    fn pending(&self) -> usize;
}

// ============================================================================
// Tokio backend
// ============================================================================

/// Spawns one tokio task per timer, each guarded by a child of a root token.
pub struct TokioTimers {
    tx: mpsc::UnboundedSender<TimerEvent>,
    root: CancellationToken,
    check: Option<CancellationToken>,
    expiries: HashMap<AnomalyId, CancellationToken>,
}

impl TokioTimers {
    pub fn new(tx: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            tx,
            root: CancellationToken::new(),
            check: None,
            expiries: HashMap::new(),
        }
    }
}

impl InjectionTimers for TokioTimers {
    fn start_checks(&mut self, every: Duration) {
        if let Some(previous) = self.check.take() {
            previous.cancel();
        }

        let token = self.root.child_token();
        let tx = self.tx.clone();
        let guard = token.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately; checks start one period in.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = guard.cancelled() => break,
                    _ = interval.tick() => {
                        if tx.send(TimerEvent::Check).is_err() {
                            break;
                        }
                    }
                }
            }
            trace!("anomaly check timer stopped");
        });
        self.check = Some(token);
    }

    fn schedule_expiry(&mut self, anomaly_id: &AnomalyId, after: Duration) {
        self.cancel_expiry(anomaly_id);

        let token = self.root.child_token();
        let tx = self.tx.clone();
        let guard = token.clone();
        let id = anomaly_id.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(TimerEvent::Expire(id));
                }
            }
        });
        self.expiries.insert(anomaly_id.clone(), token);
    }

    fn cancel_expiry(&mut self, anomaly_id: &AnomalyId) {
        if let Some(token) = self.expiries.remove(anomaly_id) {
            token.cancel();
        }
    }

    fn cancel_all(&mut self) {
        let pending = self.pending();
        self.root.cancel();
        self.root = CancellationToken::new();
        self.check = None;
        self.expiries.clear();
        debug!(pending, "cancelled injection timers");
    }

    fn pending(&self) -> usize {
        self.expiries.len() + usize::from(self.check.is_some())
    }
}

impl Drop for TokioTimers {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

// ============================================================================
// Manual backend
// ============================================================================

/// Records timer requests without spawning anything; callers fire events by
/// hand. Used for deterministic replays and tests.
#[derive(Debug, Default, Clone)]
pub struct ManualTimers {
    pub check_every: Option<Duration>,
    pub expiries: HashMap<AnomalyId, Duration>,
    pub cancellations: u32,
}

impl InjectionTimers for ManualTimers {
    fn start_checks(&mut self, every: Duration) {
        self.check_every = Some(every);
    }

    fn schedule_expiry(&mut self, anomaly_id: &AnomalyId, after: Duration) {
        self.expiries.insert(anomaly_id.clone(), after);
    }

    fn cancel_expiry(&mut self, anomaly_id: &AnomalyId) {
        self.expiries.remove(anomaly_id);
    }

    fn cancel_all(&mut self) {
        self.check_every = None;
        self.expiries.clear();
        self.cancellations += 1;
    }

    fn pending(&self) -> usize {
        self.expiries.len() + usize::from(self.check_every.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expiry_fires_after_ttl() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);

        timers.schedule_expiry(&"a-1".to_string(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, Some(TimerEvent::Expire("a-1".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_silences_pending_timers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);

        timers.start_checks(Duration::from_secs(5));
        timers.schedule_expiry(&"a-1".to_string(), Duration::from_secs(10));
        assert_eq!(timers.pending(), 2);

        timers.cancel_all();
        assert_eq!(timers.pending(), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_recurring_checks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = TokioTimers::new(tx);
        timers.start_checks(Duration::from_secs(5));

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(rx.recv().await, Some(TimerEvent::Check));
        assert_eq!(rx.recv().await, Some(TimerEvent::Check));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_manual_timers_record_requests() {
        let mut timers = ManualTimers::default();
        timers.start_checks(Duration::from_secs(30));
        timers.schedule_expiry(&"x".to_string(), Duration::from_secs(90));
        assert_eq!(timers.pending(), 2);

        timers.cancel_expiry(&"x".to_string());
        assert_eq!(timers.pending(), 1);

        timers.cancel_all();
        assert_eq!(timers.pending(), 0);
        assert_eq!(timers.cancellations, 1);
    }
}
