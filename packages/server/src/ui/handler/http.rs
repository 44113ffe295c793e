//! HTTP API endpoint handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
};

use crate::{
    domain::{AuthError, UserId},
    infrastructure::dto::http::{HealthDto, HistoryDto, RosterDto, UserDto},
    ui::state::AppState,
    usecase::FetchHistoryError,
};

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        active_connections: state.presence_broadcaster.active_connection_count().await,
    })
}

/// Current roster (online / offline with version)
pub async fn get_roster(State(state): State<Arc<AppState>>) -> Json<RosterDto> {
    let entries = state.presence_broadcaster.snapshot().await;

    // Domain Model から DTO への変換
    Json(RosterDto {
        entries: entries.into_iter().map(Into::into).collect(),
    })
}

/// Users other than the caller
pub async fn get_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserDto>>, StatusCode> {
    let user_id = authorize(&state, &headers).await?;
    let users = state.list_users_usecase.execute(&user_id).await;

    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Conversation history between the caller and `peer_id`
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(peer_id): Path<String>,
) -> Result<Json<HistoryDto>, StatusCode> {
    let user_id = authorize(&state, &headers).await?;

    match state
        .fetch_history_usecase
        .execute(&user_id, &peer_id)
        .await
    {
        Ok(messages) => Ok(Json(HistoryDto {
            peer_id,
            messages: messages.into_iter().map(Into::into).collect(),
        })),
        Err(FetchHistoryError::InvalidPeer(_)) => Err(StatusCode::BAD_REQUEST),
        Err(FetchHistoryError::Unavailable(e)) => {
            tracing::warn!("History for '{}' unavailable: {}", user_id, e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// `Authorization: Bearer <token>` からユーザーを特定する
async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    match state.authenticate_usecase.execute(token).await {
        Ok(user_id) => Ok(user_id),
        Err(AuthError::Timeout | AuthError::Unavailable(_)) => {
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}
