//! # sattrain-sim - Satellite Operations Training Simulator
//!
//! Per-session spacecraft simulation with timed fault injection and
//! deterministic scoring for operator training.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         sattrain-sim                                 │
//! │                                                                      │
//! │   SessionManager ── owner check ──► mailbox                          │
//! │          │                             │                             │
//! │          │          ┌──────────────────▼──────────────────────┐      │
//! │          │          │            SessionActor (task)           │      │
//! │          │          │                                          │      │
//! │          │          │  ┌──────────────────┐  ┌──────────────┐  │      │
//! │          │          │  │ SimulationEngine │◄─│AnomalyInjector│  │      │
//! │          │          │  │ (physics, steps) │  │ (timed faults)│  │      │
//! │          │          │  └────────┬─────────┘  └──────────────┘  │      │
//! │          │          │           ▼                              │      │
//! │          │          │     ScoringEngine (pure functions)       │      │
//! │          │          └──────────┬───────────────┬───────────────┘      │
//! │          ▼                     ▼               ▼                      │
//! │    SessionStore ◄──── snapshots       Transport::emit(room)           │
//! │                                                                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Design Principles
//!
//! 1. **One owner per session** - Each session's engine and injector live in
//!    a single actor task. Commands, ticks and timer firings never interleave.
//!
//! 2. **Timers post, the actor applies** - Injection checks and expiries are
//!    messages back to the actor, so a cancelled timer can never mutate state.
//!
//! 3. **One scoring formula** - Live projections and final scores both go
//!    through `scoring::calculate_score`.
//!
//! 4. **Storage and transport are seams** - `SessionStore` and `Transport`
//!    are traits; the core never talks to a socket or a database directly.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sattrain_sim::{BroadcastRooms, MemoryStore, SessionManager, SimConfig};
//!
//! # async fn run() -> sattrain_sim::SimResult<()> {
//! let rooms = Arc::new(BroadcastRooms::new(256));
//! let manager = SessionManager::new(SimConfig::default(), Arc::new(MemoryStore::new()), rooms.clone());
//!
//! let session = manager.create_session("op-1".into(), "leo-orbit-raise", None).await?;
//! let mut events = rooms.subscribe(&session.session_id).unwrap();
//! manager.start_session(&session.session_id).await?;
//!
//! let outcome = manager
//!     .route_command(&session.session_id, "op-1", "ARM_PROPULSION", serde_json::json!({}))
//!     .await?;
//! println!("{:?}", outcome.result);
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Available Scenarios
//!
//! | Scenario           | Difficulty   | Description                                   |
//! |--------------------|--------------|-----------------------------------------------|
//! | `leo-orbit-raise`  | Intermediate | Two-burn Hohmann transfer, 400 km → 470 km    |
//! | `power-recovery`   | Beginner     | Deploy arrays, shed load, restore pointing    |
//! | `payload-campaign` | Advanced     | Nadir imaging pass inside a contact window    |

// Core types - single source of truth
pub mod core;
pub mod error;
pub mod config;
pub mod events;

// Simulation
pub mod engine;
pub mod anomaly;
pub mod scoring;
pub mod scenarios;

// Session runtime
pub mod session;
pub mod store;
pub mod journal;
pub mod transport;

pub mod metrics;

// Re-exports for convenience
pub use core::{
    CommandRecord, CommandResult, CommandStatus, Difficulty, Session, SessionId, SessionMetrics,
    SessionSeed, SessionSnapshot, SessionStatus, SessionSummary, UserId,
};

pub use anomaly::{
    list_anomalies, AnomalyCategory, AnomalyInjector, AnomalyKind, AnomalyState, AnomalyStats,
    InjectionPolicy, Severity,
};
pub use config::SimConfig;
pub use engine::{CommandOutcome, SimulationEngine};
pub use error::{SimError, SimResult};
pub use events::SessionEvent;
pub use journal::JournalStore;
pub use scenarios::{create_scenario, list_scenarios, ScenarioDefinition};
pub use scoring::{calculate_partial_score, calculate_score, compare_scores, Score, ScoringWeights};
pub use session::SessionManager;
pub use store::{MemoryStore, SessionStore};
pub use transport::{BroadcastRooms, Transport};
