use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, JsonRejection, QueryRejection},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

use std::sync::Arc;

use crate::{
    data::model::{CreateSessionRequest, MessageExchange, MessagesQuery, PostMessageRequest},
    error::ApiError,
    middleware::AuthContext,
    services::chat::resolve_limit,
    AppState,
};

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    let sessions = state.chat.list_sessions(&auth.user_id).await?;
    Ok(Json(json!({ "sessions": sessions })))
}

/// The body is optional here, so it is read as raw bytes rather than through
/// the `Json` extractor, which insists on a JSON content type.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    body: Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = body?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice::<CreateSessionRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))?
    };

    let session = state
        .chat
        .create_session(&auth.user_id, Some(&auth.login_history_id), request.title())
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "session": session }))))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<String>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(query) = query?;
    let limit = resolve_limit(query.limit.as_deref())?;
    let messages = state
        .chat
        .list_messages(&auth.user_id, &session_id, limit)
        .await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(session_id): Path<String>,
    payload: Result<Json<PostMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageExchange>), ApiError> {
    let Json(payload) = payload?;
    let exchange = state
        .chat
        .post_message(&auth.user_id, &session_id, &payload.content())
        .await?;
    Ok((StatusCode::CREATED, Json(exchange)))
}
