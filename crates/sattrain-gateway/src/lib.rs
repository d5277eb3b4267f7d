//! sattrain-gateway: REST + WebSocket front end for `sattrain-sim`.
//!
//! ```text
//!   HTTP  /sessions/...  ──► api handlers ──┐
//!   WS    /sessions/{id}/ws ──► ws adapter ─┼──► SessionManager
//!                  ▲                        │
//!                  └── BroadcastRooms ◄─────┘ (session events)
//! ```

pub mod api;
pub mod config;
pub mod ws;

pub use api::{ApiError, ApiResponse, AppState, SimdJson, router};
pub use config::{ConfigError, GatewayConfig};
