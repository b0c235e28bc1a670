use axum::{
    routing::{get, patch, post},
    Router,
};

use std::sync::Arc;

use crate::{middleware::require_auth, AppState};

mod auth;
use auth::{login, register, update_account};
mod chat;
use chat::{create_session, list_messages, list_sessions, post_message};
mod health;
use health::health;

pub fn app_router(state: Arc<AppState>) -> Router {
    let auth_router = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/updateAccount", patch(update_account));

    let chat_router = Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route(
            "/sessions/{id}/messages",
            get(list_messages).post(post_message),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_router)
        .nest("/api/chat", chat_router)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        ai::CompletionProvider,
        testing::{send, test_state, FailingProvider, RecordingProvider},
    };

    async fn router_with(provider: Arc<dyn CompletionProvider>) -> (Router, Arc<AppState>) {
        let state = test_state(provider).await;
        (app_router(state.clone()), state)
    }

    async fn register_alice(router: &Router) -> Value {
        let (status, body) = send(
            router,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "user_id": "alice@x.com", "password": "pw1", "nickname": "Alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let (status, body) = send(&router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true, "server": "node" }));
    }

    #[tokio::test]
    async fn register_returns_token_and_history() {
        let (router, state) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let body = register_alice(&router).await;

        assert_eq!(body["user"]["nickname"], "Alice");
        assert!(body["loginHistory"]["id"].is_string());
        let claims = state.tokens.verify(body["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.user_id, body["user"]["id"].as_str().unwrap());
        assert_eq!(claims.login_history_id, body["loginHistory"]["id"].as_str().unwrap());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        register_alice(&router).await;

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "user_id": "ALICE@x.com", "password": "other", "nickname": "A2" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "User already exists");
    }

    #[tokio::test]
    async fn register_requires_all_fields() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let (status, body) = send(
            &router,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "user_id": "alice@x.com", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "user_id, password, nickname are required");
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_history() {
        let (router, state) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let registered = register_alice(&router).await;
        let user_id = registered["user"]["id"].as_str().unwrap();

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "user_id": "alice@x.com", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "message": "Invalid credentials" }));
        assert_eq!(state.auth.users().count_logins(user_id).await.unwrap(), 1);

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "user_id": " Alice@X.com ", "password": "pw1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.auth.users().count_logins(user_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let response = tower::ServiceExt::oneshot(router, request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_account_changes_nickname_and_login() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        register_alice(&router).await;

        let (status, body) = send(
            &router,
            Method::PATCH,
            "/api/auth/updateAccount",
            None,
            Some(json!({
                "target_id": "alice@x.com",
                "new_email": "alice@y.com",
                "new_nickname": "Al",
                "current_password": "pw1",
                "new_password": "pw2",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Account updated successfully");
        assert_eq!(body["user"], json!({ "user_id": "alice@y.com", "nickname": "Al" }));

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "user_id": "alice@y.com", "password": "pw2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            Method::PATCH,
            "/api/auth/updateAccount",
            None,
            Some(json!({ "target_id": "nobody@x.com", "new_nickname": "x" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_routes_require_a_valid_token() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;

        let (status, body) = send(&router, Method::GET, "/api/chat/sessions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Missing token");

        let (status, body) =
            send(&router, Method::GET, "/api/chat/sessions", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid token");
    }

    #[tokio::test]
    async fn session_without_body_is_created_and_listed() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let token = register_alice(&router).await["token"].as_str().unwrap().to_string();

        let (status, body) =
            send(&router, Method::POST, "/api/chat/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session"]["title"], Value::Null);
        let id = body["session"]["id"].clone();

        let (status, body) =
            send(&router, Method::GET, "/api/chat/sessions", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let sessions = body["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], id);
    }

    #[tokio::test]
    async fn non_string_title_is_ignored() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let token = register_alice(&router).await["token"].as_str().unwrap().to_string();

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/chat/sessions",
            Some(&token),
            Some(json!({ "title": 42 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session"]["title"], Value::Null);

        let (_, body) = send(
            &router,
            Method::POST,
            "/api/chat/sessions",
            Some(&token),
            Some(json!({ "title": "Quarterly numbers" })),
        )
        .await;
        assert_eq!(body["session"]["title"], "Quarterly numbers");
    }

    #[tokio::test]
    async fn message_round_trip_and_validation() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("hello back"))).await;
        let token = register_alice(&router).await["token"].as_str().unwrap().to_string();
        let (_, body) = send(&router, Method::POST, "/api/chat/sessions", Some(&token), None).await;
        let path = format!(
            "/api/chat/sessions/{}/messages",
            body["session"]["id"].as_str().unwrap()
        );

        let (status, body) = send(
            &router,
            Method::POST,
            &path,
            Some(&token),
            Some(json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "content is required");

        let (status, body) = send(
            &router,
            Method::POST,
            &path,
            Some(&token),
            Some(json!({ "content": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["userMessage"]["role"], "user");
        assert_eq!(body["botMessage"]["role"], "bot");
        assert_eq!(body["botMessage"]["content"], "hello back");

        let (status, body) =
            send(&router, Method::GET, &format!("{}?limit=1", path), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);

        let (status, body) =
            send(&router, Method::GET, &format!("{}?limit=abc", path), Some(&token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid limit");

        let (status, body) = send(
            &router,
            Method::GET,
            &format!("{}?limit=1&limit=2", path),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn foreign_session_is_not_found() {
        let (router, _) = router_with(Arc::new(RecordingProvider::replying("ok"))).await;
        let alice = register_alice(&router).await["token"].as_str().unwrap().to_string();
        let (_, bob) = send(
            &router,
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "user_id": "bob@x.com", "password": "pw", "nickname": "Bob" })),
        )
        .await;
        let bob = bob["token"].as_str().unwrap().to_string();

        let (_, body) = send(&router, Method::POST, "/api/chat/sessions", Some(&alice), None).await;
        let path = format!(
            "/api/chat/sessions/{}/messages",
            body["session"]["id"].as_str().unwrap()
        );

        let (status, body) = send(&router, Method::GET, &path, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Session not found");
    }

    #[tokio::test]
    async fn provider_failure_is_500_but_keeps_user_message() {
        let (router, _) = router_with(Arc::new(FailingProvider)).await;
        let token = register_alice(&router).await["token"].as_str().unwrap().to_string();
        let (_, body) = send(&router, Method::POST, "/api/chat/sessions", Some(&token), None).await;
        let path = format!(
            "/api/chat/sessions/{}/messages",
            body["session"]["id"].as_str().unwrap()
        );

        let (status, body) = send(
            &router,
            Method::POST,
            &path,
            Some(&token),
            Some(json!({ "content": "anyone there?" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].is_string());

        let (status, body) = send(&router, Method::GET, &path, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "anyone there?");
    }
}
