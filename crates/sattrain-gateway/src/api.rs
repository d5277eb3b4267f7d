//! REST handlers.
//!
//! Callers are identified by the `x-user-id` header (authentication happens
//! upstream). Mutating routes require the caller to own the session.

use crate::ws::ws_handler;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use prometheus::{Encoder, TextEncoder};
use sattrain_sim::{
    AnomalyKind, AnomalyState, AnomalyStats, BroadcastRooms, CommandOutcome, Difficulty, Score,
    SessionManager, SessionSnapshot, SessionStatus, SessionSummary, SimError, list_anomalies,
    list_scenarios,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub rooms: Arc<BroadcastRooms>,
}

// ============================================================================
// SIMD-JSON EXTRACTOR
// ============================================================================

pub struct SimdJson<T>(pub T);

impl<T, S> FromRequest<S> for SimdJson<T>
where
    T: for<'de> Deserialize<'de> + Send,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| e.into_response())?;
        let mut bytes_vec = bytes.to_vec();

        let val = simd_json::from_slice::<T>(&mut bytes_vec).map_err(|e| {
            ApiError::BadRequest(format!("invalid JSON: {e}")).into_response()
        })?;

        Ok(SimdJson(val))
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Generic API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    Sim(SimError),
    MissingCaller,
    BadRequest(String),
}

impl From<SimError> for ApiError {
    fn from(e: SimError) -> Self {
        Self::Sim(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCaller => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Sim(e) => match e {
                SimError::SessionNotFound(_) | SimError::UnknownScenario(_) => StatusCode::NOT_FOUND,
                SimError::NotSessionOwner { .. } => StatusCode::FORBIDDEN,
                SimError::InvalidSessionState { .. }
                | SimError::SessionAlreadyActive(_)
                | SimError::AnomalyRejected(_)
                | SimError::StaleVersion { .. } => StatusCode::CONFLICT,
                SimError::CommandValidation(_) | SimError::InvalidWeights(_) => StatusCode::BAD_REQUEST,
                SimError::ShutDown => StatusCode::SERVICE_UNAVAILABLE,
                SimError::AchievementCheck { .. } | SimError::Persistence(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Sim(e) => e.to_string(),
            Self::MissingCaller => format!("missing {USER_HEADER} header"),
            Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.message(), "request failed");
        }
        (status, Json(ApiResponse::<()>::error(&self.message()))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

pub fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::MissingCaller)
}

/// Resolve the caller and check they own a live session.
async fn owner(state: &AppState, session_id: &String, headers: &HeaderMap) -> Result<String, ApiError> {
    let user = caller(headers)?;
    match state.manager.owner_of(session_id).await {
        None => Err(SimError::SessionNotFound(session_id.clone()).into()),
        Some(owner) if owner != user => Err(SimError::NotSessionOwner {
            session_id: session_id.clone(),
            caller: user,
        }
        .into()),
        Some(_) => Ok(user),
    }
}

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(alias = "scenario")]
    pub scenario_id: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    #[serde(alias = "name")]
    pub command: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InjectRequest {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomaliesResponse {
    pub active: Vec<AnomalyState>,
    pub stats: AnomalyStats,
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn list_scenarios_handler() -> Json<ApiResponse<Vec<CatalogEntry>>> {
    let entries = list_scenarios()
        .into_iter()
        .map(|(id, description)| CatalogEntry { id, description })
        .collect();
    Json(ApiResponse::success(entries))
}

pub async fn anomaly_catalog_handler() -> Json<ApiResponse<Vec<CatalogEntry>>> {
    let entries = list_anomalies()
        .into_iter()
        .map(|(id, description)| CatalogEntry { id, description })
        .collect();
    Json(ApiResponse::success(entries))
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    SimdJson(req): SimdJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionSummary>>), ApiError> {
    let user = caller(&headers)?;
    let summary = state
        .manager
        .create_session(user, &req.scenario_id, req.difficulty)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(summary))))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    ok(state.manager.snapshot(&session_id).await?)
}

pub async fn start_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusResponse> {
    owner(&state, &session_id, &headers).await?;
    let status = state.manager.start_session(&session_id).await?;
    ok(StatusResponse { status })
}

pub async fn pause_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusResponse> {
    owner(&state, &session_id, &headers).await?;
    let status = state.manager.pause_session(&session_id).await?;
    ok(StatusResponse { status })
}

pub async fn resume_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusResponse> {
    owner(&state, &session_id, &headers).await?;
    let status = state.manager.resume_session(&session_id).await?;
    ok(StatusResponse { status })
}

pub async fn terminate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Score> {
    owner(&state, &session_id, &headers).await?;
    ok(state.manager.terminate_session(&session_id).await?)
}

pub async fn send_command(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    SimdJson(req): SimdJson<CommandRequest>,
) -> ApiResult<CommandOutcome> {
    let user = caller(&headers)?;
    let outcome = state
        .manager
        .route_command(&session_id, &user, &req.command, req.payload)
        .await?;
    ok(outcome)
}

pub async fn get_score(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Score> {
    ok(state.manager.partial_score(&session_id).await?)
}

pub async fn get_anomalies(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<AnomaliesResponse> {
    let active = state.manager.active_anomalies(&session_id).await;
    let stats = state.manager.anomaly_stats(&session_id).await;
    ok(AnomaliesResponse { active, stats })
}

/// Instructor-triggered fault.
pub async fn inject_anomaly(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    SimdJson(req): SimdJson<InjectRequest>,
) -> ApiResult<AnomalyState> {
    owner(&state, &session_id, &headers).await?;
    ok(state.manager.inject_anomaly(&session_id, req.kind).await?)
}

pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }
    match String::from_utf8(buffer) {
        Ok(text) => text.into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn health_handler() -> &'static str {
    "OK"
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scenarios", get(list_scenarios_handler))
        .route("/anomalies", get(anomaly_catalog_handler))
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(terminate_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/commands", post(send_command))
        .route("/sessions/{id}/score", get(get_score))
        .route(
            "/sessions/{id}/anomalies",
            get(get_anomalies).post(inject_anomaly),
        )
        .route("/sessions/{id}/ws", get(ws_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use sattrain_sim::{CommandStatus, MemoryStore, SimConfig};
    use serde_json::json;

    fn state() -> AppState {
        let rooms = Arc::new(BroadcastRooms::new(64));
        let config = SimConfig {
            rng_seed: Some(1),
            ..Default::default()
        };
        let manager = SessionManager::new(config, Arc::new(MemoryStore::new()), rooms.clone());
        AppState { manager, rooms }
    }

    fn as_user(user: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_HEADER, HeaderValue::from_str(user).unwrap());
        headers
    }

    async fn create(state: &AppState, user: &str) -> String {
        let (status, Json(body)) = create_session(
            State(state.clone()),
            as_user(user),
            SimdJson(CreateSessionRequest {
                scenario_id: "leo-orbit-raise".into(),
                difficulty: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        body.data.unwrap().session_id
    }

    #[tokio::test]
    async fn test_create_requires_caller() {
        let state = state();
        let err = create_session(
            State(state.clone()),
            HeaderMap::new(),
            SimdJson(CreateSessionRequest {
                scenario_id: "leo-orbit-raise".into(),
                difficulty: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        state.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_error_statuses() {
        assert_eq!(
            ApiError::from(SimError::SessionNotFound("x".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(SimError::NotSessionOwner {
                session_id: "x".into(),
                caller: "y".into()
            })
            .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::from(SimError::ShutDown).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(SimError::AnomalyRejected("cap".into())).status(),
            StatusCode::CONFLICT
        );
    }

    #[tokio::test]
    async fn test_session_flow_over_handlers() {
        let state = state();
        let id = create(&state, "alice").await;

        let err = start_session(State(state.clone()), Path(id.clone()), as_user("bob"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let Json(started) = start_session(State(state.clone()), Path(id.clone()), as_user("alice"))
            .await
            .unwrap();
        assert_eq!(started.data.unwrap().status, SessionStatus::InProgress);

        let Json(outcome) = send_command(
            State(state.clone()),
            Path(id.clone()),
            as_user("alice"),
            SimdJson(CommandRequest {
                command: "ARM_PROPULSION".into(),
                payload: json!({}),
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome.data.unwrap().result.status, CommandStatus::Ok);

        let Json(score) = get_score(State(state.clone()), Path(id.clone())).await.unwrap();
        assert!((score.data.unwrap().coverage - 20.0).abs() < 1e-9);

        let Json(snapshot) = get_session(State(state.clone()), Path(id.clone())).await.unwrap();
        assert_eq!(snapshot.data.unwrap().progress.current_step, 1);

        let Json(score) = terminate_session(State(state.clone()), Path(id.clone()), as_user("alice"))
            .await
            .unwrap();
        assert!(score.success);
        state.manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_unknown_session_anomalies_are_empty() {
        let state = state();
        let Json(body) = get_anomalies(State(state.clone()), Path("missing".into()))
            .await
            .unwrap();
        let data = body.data.unwrap();
        assert!(data.active.is_empty());
        assert_eq!(data.stats.injected, 0);
    }

    #[tokio::test]
    async fn test_health_and_catalogs() {
        assert_eq!(health_handler().await, "OK");
        let Json(scenarios) = list_scenarios_handler().await;
        assert_eq!(scenarios.data.unwrap().len(), 3);
        let Json(anomalies) = anomaly_catalog_handler().await;
        assert_eq!(anomalies.data.unwrap().len(), 11);
    }
}
