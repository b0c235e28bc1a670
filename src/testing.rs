//! Shared fixtures for the in-crate test suites.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    ai::{completion::CompletionError, CompletionMessage, CompletionProvider},
    config::Config,
    data::{ChatRepository, Database, UserRepository},
    services::{AuthService, ChatService, SessionTokens},
    AppState,
};

/// Replies with a fixed text and remembers the last context it was given.
pub struct RecordingProvider {
    reply: Option<String>,
    last: Mutex<Vec<CompletionMessage>>,
}

impl RecordingProvider {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            last: Mutex::new(Vec::new()),
        }
    }

    /// Succeeds without producing any text.
    pub fn silent() -> Self {
        Self {
            reply: None,
            last: Mutex::new(Vec::new()),
        }
    }

    pub fn last_context(&self) -> Vec<CompletionMessage> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for RecordingProvider {
    async fn complete(
        &self,
        messages: &[CompletionMessage],
    ) -> Result<Option<String>, CompletionError> {
        *self.last.lock().unwrap() = messages.to_vec();
        Ok(self.reply.clone())
    }
}

pub struct FailingProvider;

#[async_trait]
impl CompletionProvider for FailingProvider {
    async fn complete(
        &self,
        _messages: &[CompletionMessage],
    ) -> Result<Option<String>, CompletionError> {
        Err(CompletionError::Status {
            status: 500,
            body: "upstream exploded".to_string(),
        })
    }
}

pub async fn test_state(provider: Arc<dyn CompletionProvider>) -> Arc<AppState> {
    let config = Config::for_tests();
    let db = Arc::new(Database::in_memory().await.unwrap());
    let tokens = SessionTokens::new(&config.jwt_secret);
    let auth = AuthService::new(UserRepository::new(db.clone()), tokens.clone());
    let chat = ChatService::new(ChatRepository::new(db), provider);

    Arc::new(AppState {
        auth,
        chat,
        tokens,
    })
}

/// Send one request through `router` and decode the JSON body (`Null` if none).
pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
