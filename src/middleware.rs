use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{error::ApiError, services::ClientInfo, AppState};

/// Identity of the caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub login_history_id: String,
}

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Gate for protected routes: verifies the bearer token and stores its claims
/// as an [`AuthContext`] extension.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&req) else {
        return ApiError::unauthorized("Missing token").into_response();
    };

    match state.tokens.verify(token) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthContext {
                user_id: claims.user_id,
                login_history_id: claims.login_history_id,
            });
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

/// Best-effort client address and user agent for the login history.
///
/// The first `X-Forwarded-For` hop wins over the socket address, matching a
/// server that sits behind exactly one proxy.
pub struct ClientMeta(pub ClientInfo);

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        let ip_address = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(ClientMeta(ClientInfo {
            ip_address,
            user_agent,
        }))
    }
}
