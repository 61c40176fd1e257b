use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{
        FavoriteAction, InteractionKind, PreferenceWeights, ProductId, RecommendationRequest,
        RecommendationResponse, UserBehaviorSnapshot, ViewSource,
    },
};

use super::AppState;

// Request/Response types

#[derive(Debug, Default, Deserialize)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub session_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OpenSessionResponse {
    pub session_key: String,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_key: String,
    pub open_view: Option<ProductId>,
    pub resident: bool,
    pub snapshot: UserBehaviorSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct TrackViewRequest {
    pub product_id: ProductId,
    #[serde(default = "default_view_source")]
    pub source: ViewSource,
}

fn default_view_source() -> ViewSource {
    ViewSource::Direct
}

#[derive(Debug, Deserialize)]
pub struct ScrollRequest {
    pub depth: u8,
}

#[derive(Debug, Deserialize)]
pub struct TrackSearchRequest {
    pub query: String,
    #[serde(default)]
    pub results_shown: u32,
}

#[derive(Debug, Deserialize)]
pub struct SearchClickRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct SearchClickResponse {
    pub attributed: bool,
}

#[derive(Debug, Deserialize)]
pub struct ComparisonRequest {
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Serialize)]
pub struct EndComparisonResponse {
    pub duration_seconds: f64,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub product_id: ProductId,
    pub action: FavoriteAction,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserRecommendationsQuery {
    #[serde(default)]
    pub session_key: Option<String>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Open a new session or resume an existing one
pub async fn open_session(
    State(state): State<AppState>,
    body: Option<Json<OpenSessionRequest>>,
) -> (StatusCode, Json<OpenSessionResponse>) {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let (session_key, tracker) = state.sessions.open(request.session_key).await;
    let session_id = tracker.lock().await.snapshot().session_id;

    (
        StatusCode::CREATED,
        Json(OpenSessionResponse {
            session_key,
            session_id,
        }),
    )
}

/// Current snapshot of a session, live or persisted. Reading never opens the session.
pub async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<Json<SessionResponse>> {
    let view = state
        .sessions
        .view(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", key)))?;

    Ok(Json(SessionResponse {
        session_key: key,
        open_view: view.open_view,
        resident: view.resident,
        snapshot: view.snapshot,
    }))
}

/// Tear a session down: close the open view, persist, evict
pub async fn end_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<StatusCode> {
    state.sessions.end(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn track_view(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<TrackViewRequest>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker
        .lock()
        .await
        .track_product_view(request.product_id, request.source);
    StatusCode::NO_CONTENT
}

pub async fn update_scroll(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<ScrollRequest>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.update_scroll_depth(request.depth);
    StatusCode::NO_CONTENT
}

pub async fn track_search(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<TrackSearchRequest>,
) -> AppResult<StatusCode> {
    if request.query.trim().is_empty() {
        return Err(AppError::InvalidInput("Search query must not be empty".to_string()));
    }

    let tracker = state.sessions.get_or_resume(&key).await;
    tracker
        .lock()
        .await
        .track_search(&request.query, request.results_shown);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn track_search_click(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<SearchClickRequest>,
) -> Json<SearchClickResponse> {
    let tracker = state.sessions.get_or_resume(&key).await;
    let attributed = tracker.lock().await.track_search_click(request.product_id);
    Json(SearchClickResponse { attributed })
}

pub async fn track_comparison(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<ComparisonRequest>,
) -> AppResult<StatusCode> {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.track_comparison(&request.product_ids)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn end_comparison(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<ComparisonRequest>,
) -> AppResult<Json<EndComparisonResponse>> {
    let tracker = state.sessions.get_or_resume(&key).await;
    let duration_seconds = tracker
        .lock()
        .await
        .end_comparison(&request.product_ids)
        .ok_or_else(|| AppError::NotFound("No open comparison of these products".to_string()))?;
    Ok(Json(EndComparisonResponse { duration_seconds }))
}

pub async fn track_favorite(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<FavoriteRequest>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker
        .lock()
        .await
        .track_favorite(request.product_id, request.action);
    StatusCode::NO_CONTENT
}

pub async fn track_interaction(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<InteractionRequest>,
) -> AppResult<StatusCode> {
    if request.kind.trim().is_empty() {
        return Err(AppError::InvalidInput("Interaction type must not be empty".to_string()));
    }

    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.track_interaction(
        InteractionKind::from_name(&request.kind),
        request.target,
        request.metadata,
    );
    Ok(StatusCode::NO_CONTENT)
}

/// The host app went to the background
pub async fn suspend_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.on_suspend().await;
    StatusCode::NO_CONTENT
}

/// The host app came back to the foreground
pub async fn resume_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.on_resume();
    StatusCode::NO_CONTENT
}

/// Persists a resident session now
pub async fn flush_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<StatusCode> {
    let tracker = state.sessions.get(&key).await?;
    tracker.lock().await.flush().await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_behavior(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> StatusCode {
    let tracker = state.sessions.get_or_resume(&key).await;
    tracker.lock().await.clear_behavior().await;
    StatusCode::NO_CONTENT
}

/// Preference weights derived from a user's reviews
pub async fn get_preference_weights(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<PreferenceWeights>> {
    let weights = state.engine.preference_weights(user_id).await?;
    Ok(Json(weights))
}

/// Personalized recommendations for a user; top-rated on cold start
pub async fn get_user_recommendations(
    State(state): State<AppState>,
    request_id: RequestId,
    Path(user_id): Path<Uuid>,
    Query(query): Query<UserRecommendationsQuery>,
) -> AppResult<Json<RecommendationResponse>> {
    let request = RecommendationRequest {
        user_id: Some(user_id),
        session_key: query.session_key,
        ..Default::default()
    };
    serve_recommendations(&state, request_id, request).await
}

/// Recommendations in product-based, preference-based or trending mode
pub async fn recommend(
    State(state): State<AppState>,
    request_id: RequestId,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    serve_recommendations(&state, request_id, request).await
}

async fn serve_recommendations(
    state: &AppState,
    request_id: RequestId,
    mut request: RecommendationRequest,
) -> AppResult<Json<RecommendationResponse>> {
    let behavior = match (request.behavior_data.take(), request.session_key.as_deref()) {
        (Some(inline), _) => Some(inline),
        (None, Some(key)) => state
            .sessions
            .snapshot(key)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(
                    request_id = %request_id,
                    session_key = %key,
                    error = %e,
                    "Session behavior unavailable, recommending without it"
                );
                None
            }),
        (None, None) => None,
    };

    let response = state
        .engine
        .recommend(&request, behavior.as_ref())
        .await
        .inspect_err(|e| {
            tracing::error!(request_id = %request_id, error = %e, "Recommendation request failed");
        })?;

    Ok(Json(response))
}
