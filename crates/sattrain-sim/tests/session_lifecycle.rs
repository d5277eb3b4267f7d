use sattrain_sim::{
    AnomalyKind, BroadcastRooms, CommandStatus, Difficulty, MemoryStore, SessionEvent,
    SessionManager, SessionStatus, SessionStore, SimConfig, SimError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Harness {
    manager: Arc<SessionManager>,
    rooms: Arc<BroadcastRooms>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    let rooms = Arc::new(BroadcastRooms::new(256));
    let store = Arc::new(MemoryStore::new());
    let config = SimConfig {
        rng_seed: Some(42),
        ..Default::default()
    };
    let manager = SessionManager::new(config, store.clone(), rooms.clone());
    Harness {
        manager,
        rooms,
        store,
    }
}

/// Wait for the first event with the given name.
async fn wait_for(
    rx: &mut broadcast::Receiver<Arc<SessionEvent>>,
    name: &str,
) -> Arc<SessionEvent> {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            match rx.recv().await {
                Ok(event) if event.name() == name => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("room closed before {name}"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
}

async fn wait_released(manager: &SessionManager, id: &String) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.owner_of(id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session was not released");
}

#[tokio::test(start_paused = true)]
async fn test_commands_are_routed_only_for_the_owner() {
    let h = harness();
    let session = h
        .manager
        .create_session("alice".into(), "leo-orbit-raise", None)
        .await
        .unwrap();
    let id = session.session_id.clone();
    h.manager.start_session(&id).await.unwrap();

    let err = h
        .manager
        .route_command(&id, "mallory", "ARM_PROPULSION", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::NotSessionOwner { .. }));

    let err = h
        .manager
        .route_command(&"nope".to_string(), "alice", "ARM_PROPULSION", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err, SimError::SessionNotFound("nope".into()));

    let outcome = h
        .manager
        .route_command(&id, "alice", "ARM_PROPULSION", json!({}))
        .await
        .unwrap();
    assert_eq!(outcome.result.status, CommandStatus::Ok);
    assert_eq!(outcome.completed_step.as_deref(), Some("arm-propulsion"));

    // Malformed payloads come back as ERROR results, not call failures.
    let outcome = h
        .manager
        .route_command(&id, "alice", "EXECUTE_BURN", json!({"deltaVMs": -3}))
        .await
        .unwrap();
    assert_eq!(outcome.result.status, CommandStatus::Error);

    assert_eq!(h.store.commands(&id).await.len(), 2);
    h.manager.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_power_recovery_runs_to_completion() {
    let h = harness();
    let session = h
        .manager
        .create_session("op".into(), "power-recovery", None)
        .await
        .unwrap();
    let id = session.session_id.clone();
    let mut rx = h.rooms.subscribe(&id).unwrap();

    assert_eq!(h.manager.start_session(&id).await.unwrap(), SessionStatus::InProgress);

    let plan = [
        ("DEPLOY_SOLAR_ARRAYS", json!({})),
        ("SHED_LOAD", json!({})),
        ("RESET_REACTION_WHEELS", json!({})),
        ("SET_ATTITUDE_MODE", json!({"mode": "SUN_POINTING"})),
    ];
    let mut last = None;
    for (name, payload) in plan {
        let outcome = h.manager.route_command(&id, "op", name, payload).await.unwrap();
        assert_eq!(outcome.result.status, CommandStatus::Ok, "{name}");
        last = Some(outcome);
    }
    assert_eq!(last.unwrap().status, SessionStatus::Completed);

    let completed = wait_for(&mut rx, "session:completed").await;
    let SessionEvent::Completed(done) = completed.as_ref() else {
        panic!("unexpected event");
    };
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.score.coverage, 100.0);
    assert!(done.score.total > 0);

    wait_released(&h.manager, &id).await;
    assert!(!h.rooms.has_room(&id));

    // Ended sessions still answer from their persisted snapshot.
    let snapshot = h.manager.snapshot(&id).await.unwrap();
    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(h.manager.partial_score(&id).await.unwrap().total, done.score.total);

    let err = h
        .manager
        .route_command(&id, "op", "SHED_LOAD", json!({}))
        .await
        .unwrap_err();
    assert_eq!(err, SimError::SessionNotFound(id.clone()));
}

#[tokio::test(start_paused = true)]
async fn test_pause_blocks_commands_until_resume() {
    let h = harness();
    let id = h
        .manager
        .create_session("op".into(), "leo-orbit-raise", None)
        .await
        .unwrap()
        .session_id;
    h.manager.start_session(&id).await.unwrap();
    assert_eq!(h.manager.pause_session(&id).await.unwrap(), SessionStatus::Paused);

    let err = h
        .manager
        .route_command(&id, "op", "ARM_PROPULSION", json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SimError::InvalidSessionState { .. }));
    assert!(h.manager.pause_session(&id).await.is_err());

    assert_eq!(h.manager.resume_session(&id).await.unwrap(), SessionStatus::InProgress);
    assert!(h
        .manager
        .route_command(&id, "op", "ARM_PROPULSION", json!({}))
        .await
        .is_ok());
    h.manager.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_terminate_abandons_and_releases() {
    let h = harness();
    let id = h
        .manager
        .create_session("op".into(), "leo-orbit-raise", None)
        .await
        .unwrap()
        .session_id;
    let mut rx = h.rooms.subscribe(&id).unwrap();
    h.manager.start_session(&id).await.unwrap();

    let score = h.manager.terminate_session(&id).await.unwrap();
    assert_eq!(score.coverage, 0.0);

    let event = wait_for(&mut rx, "session:completed").await;
    let SessionEvent::Completed(done) = event.as_ref() else {
        panic!("unexpected event");
    };
    assert_eq!(done.status, SessionStatus::Abandoned);

    wait_released(&h.manager, &id).await;
    assert!(matches!(
        h.manager.terminate_session(&id).await,
        Err(SimError::SessionNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_manual_injection_and_corrective_command() {
    let h = harness();
    let id = h
        .manager
        .create_session("op".into(), "leo-orbit-raise", Some(Difficulty::Expert))
        .await
        .unwrap()
        .session_id;
    let mut rx = h.rooms.subscribe(&id).unwrap();

    // Not running until the session starts.
    assert!(matches!(
        h.manager.inject_anomaly(&id, AnomalyKind::SolarArrayDegradation).await,
        Err(SimError::AnomalyRejected(_))
    ));
    h.manager.start_session(&id).await.unwrap();

    let anomaly = h
        .manager
        .inject_anomaly(&id, AnomalyKind::SolarArrayDegradation)
        .await
        .unwrap();
    wait_for(&mut rx, "anomaly:detected").await;
    assert!(h
        .manager
        .active_anomalies(&id)
        .await
        .iter()
        .any(|a| a.id == anomaly.id));

    let outcome = h
        .manager
        .route_command(&id, "op", "SHED_LOAD", json!({}))
        .await
        .unwrap();
    assert_eq!(outcome.resolved.len(), 1);
    assert_eq!(outcome.resolved[0].id, anomaly.id);
    wait_for(&mut rx, "anomaly:resolved").await;

    let stats = h.manager.anomaly_stats(&id).await;
    assert!(stats.injected >= 1);
    assert!(stats.resolved >= 1);
    h.manager.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_telemetry_is_pushed_while_running() {
    let h = harness();
    let id = h
        .manager
        .create_session("op".into(), "leo-orbit-raise", None)
        .await
        .unwrap()
        .session_id;
    let mut rx = h.rooms.subscribe(&id).unwrap();
    h.manager.start_session(&id).await.unwrap();

    let event = wait_for(&mut rx, "telemetry:update").await;
    let SessionEvent::Telemetry(snapshot) = event.as_ref() else {
        panic!("unexpected event");
    };
    assert_eq!(snapshot.session_id, id);
    assert_eq!(snapshot.status, SessionStatus::InProgress);
    h.manager.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_all_persists_every_session() {
    let h = harness();
    let mut ids = Vec::new();
    for scenario in ["leo-orbit-raise", "power-recovery"] {
        let id = h
            .manager
            .create_session("op".into(), scenario, None)
            .await
            .unwrap()
            .session_id;
        h.manager.start_session(&id).await.unwrap();
        ids.push(id);
    }
    assert_eq!(h.manager.len().await, 2);

    h.manager.stop_all().await;
    h.manager.stop_all().await;

    assert_eq!(h.manager.len().await, 0);
    for id in &ids {
        assert!(!h.rooms.has_room(id));
        let snapshot = h.store.load_snapshot(id).await.unwrap();
        assert!(snapshot.is_some());
    }
    assert!(h.manager.is_closed());
}
