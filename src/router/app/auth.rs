use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use std::sync::Arc;

use crate::{
    data::model::{AuthResponse, LoginRequest, RegisterRequest, UpdateAccountRequest, UpdateAccountResponse},
    error::ApiError,
    middleware::ClientMeta,
    AppState,
};

pub async fn register(
    State(state): State<Arc<AppState>>,
    ClientMeta(client): ClientMeta,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(payload) = payload?;
    let response = state
        .auth
        .register(&payload.user_id, &payload.password, &payload.nickname, &client)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    ClientMeta(client): ClientMeta,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(payload) = payload?;
    let response = state
        .auth
        .login(&payload.user_id, &payload.password, &client)
        .await?;
    tracing::info!(ip = %client.ip_address, "login succeeded");
    Ok(Json(response))
}

pub async fn update_account(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Json<UpdateAccountResponse>, ApiError> {
    let Json(payload) = payload?;
    Ok(Json(state.auth.update_account(payload).await?))
}
