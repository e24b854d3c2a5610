//! REST endpoints for the onboarding conversation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::manager::OnboardingManager;
use crate::error::Error;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub manager: Arc<OnboardingManager>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    user_id: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinueRequest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushRequest {
    user_id: String,
    repo: String,
}

fn internal_error(e: Error) -> Response {
    tracing::warn!("Onboarding request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
        .into_response()
}

/// POST /api/onboarding/message
///
/// Runs one turn and returns the new state and the events to render.
async fn post_message(
    State(state): State<OnboardingRouteState>,
    Json(req): Json<MessageRequest>,
) -> Response {
    match state
        .manager
        .process_message(&req.user_id, &req.content)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/onboarding/continue
///
/// Runs the auto state a previous turn yielded in.
async fn post_continue(
    State(state): State<OnboardingRouteState>,
    Json(req): Json<ContinueRequest>,
) -> Response {
    match state.manager.continue_turn(&req.user_id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /api/onboarding/status/{user_id}
async fn get_status(
    State(state): State<OnboardingRouteState>,
    Path(user_id): Path<String>,
) -> Response {
    match state.manager.get_status(&user_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "No onboarding session for this user"})),
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /api/onboarding/push
///
/// Webhook relay: a push landed on `repo`.
async fn post_push(
    State(state): State<OnboardingRouteState>,
    Json(req): Json<PushRequest>,
) -> Response {
    match state.manager.record_push(&req.user_id, &req.repo).await {
        Ok(recorded) => Json(serde_json::json!({"recorded": recorded})).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/api/onboarding/message", post(post_message))
        .route("/api/onboarding/continue", post(post_continue))
        .route("/api/onboarding/status/{user_id}", get(get_status))
        .route("/api/onboarding/push", post(post_push))
        .with_state(state)
}
