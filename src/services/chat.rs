use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    ai::{CompletionMessage, CompletionProvider},
    data::{
        model::{ChatMessage, ChatSession, MessageExchange, MessageRole, MessageView, SessionView},
        repository::ChatRepository,
    },
    error::ApiError,
};

pub const SESSION_LIST_LIMIT: i64 = 20;
pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;
pub const MAX_MESSAGE_LIMIT: i64 = 200;
/// How many of the newest messages are sent to the provider as context.
pub const CONTEXT_WINDOW: i64 = 20;
pub const FALLBACK_REPLY: &str = "Sorry, I could not generate a response.";

/// Resolve the `limit` query parameter: default 50, clamped to `1..=200`.
pub fn resolve_limit(raw: Option<&str>) -> Result<i64, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(DEFAULT_MESSAGE_LIMIT),
        Some(value) => value
            .parse::<i64>()
            .map(|n| n.clamp(1, MAX_MESSAGE_LIMIT))
            .map_err(|_| ApiError::bad_request("Invalid limit")),
    }
}

fn parse_session_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::bad_request("Invalid sessionId"))
}

/// Per-user conversations whose user turns are answered by a completion
/// provider.
#[derive(Clone)]
pub struct ChatService {
    repo: ChatRepository,
    provider: Arc<dyn CompletionProvider>,
}

impl ChatService {
    pub fn new(repo: ChatRepository, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { repo, provider }
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionView>, ApiError> {
        let sessions = self.repo.list_sessions(user_id, SESSION_LIST_LIMIT).await?;
        Ok(sessions.iter().map(SessionView::from).collect())
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        login_history_id: Option<&str>,
        title: Option<String>,
    ) -> Result<SessionView, ApiError> {
        let session = self
            .repo
            .create_session(user_id, login_history_id, title)
            .await?;
        tracing::debug!(session_id = %session.id, user_id, "chat session created");
        Ok(SessionView::from(&session))
    }

    async fn owned_session(&self, user_id: &str, session_id: &str) -> Result<ChatSession, ApiError> {
        let session_id = parse_session_id(session_id)?;
        self.repo
            .find_active_session(user_id, &session_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Session not found"))
    }

    pub async fn list_messages(
        &self,
        user_id: &str,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<MessageView>, ApiError> {
        let session = self.owned_session(user_id, session_id).await?;
        let limit = limit.clamp(1, MAX_MESSAGE_LIMIT);
        let messages = self.repo.list_messages(&session.id, user_id, limit).await?;
        Ok(messages.iter().map(MessageView::from).collect())
    }

    /// Append a user turn, ask the provider for a reply and append that too.
    ///
    /// The user message is not rolled back when the provider fails; the
    /// session is then left with a user turn that has no reply.
    pub async fn post_message(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
    ) -> Result<MessageExchange, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::bad_request("content is required"));
        }

        let session = self.owned_session(user_id, session_id).await?;

        let user_message = self
            .repo
            .insert_message(&session.id, user_id, MessageRole::User, content)
            .await?;

        let history = self.repo.recent_messages(&session.id, CONTEXT_WINDOW).await?;
        let context = to_provider_context(&history);

        let reply = match self.provider.complete(&context).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    message_id = %user_message.id,
                    "user message kept without a reply"
                );
                return Err(ApiError::Provider(e.to_string()));
            }
        };

        let bot_message = self
            .repo
            .insert_message(
                &session.id,
                user_id,
                MessageRole::Bot,
                reply.as_deref().unwrap_or(FALLBACK_REPLY),
            )
            .await?;

        self.repo.touch_session(&session.id, Utc::now()).await?;

        Ok(MessageExchange {
            user_message: MessageView::from(&user_message),
            bot_message: MessageView::from(&bot_message),
        })
    }
}

fn to_provider_context(history: &[ChatMessage]) -> Vec<CompletionMessage> {
    history
        .iter()
        .map(|m| CompletionMessage {
            role: m.role.provider_role().to_string(),
            content: m.content.clone(),
        })
        .collect()
}
