use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored account. `login_id` is always trimmed and lower-cased.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub login_id: String,
    pub password_hash: String,
    pub nickname: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginHistory {
    pub id: String,
    pub user_id: String,
    pub ip_address: String,
    pub user_agent: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub login_history_id: Option<String>,
    pub title: Option<String>,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    /// Last activity; bumped on every appended message.
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    pub content: String,
    pub model_input_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Bot,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Bot => "bot",
            MessageRole::System => "system",
        }
    }

    /// Role name in the completion provider's vocabulary.
    pub fn provider_role(&self) -> &'static str {
        match self {
            MessageRole::Bot => "assistant",
            other => other.as_str(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message role: {0}")]
pub struct UnknownRole(String);

impl TryFrom<String> for MessageRole {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "user" => Ok(MessageRole::User),
            "bot" => Ok(MessageRole::Bot),
            "system" => Ok(MessageRole::System),
            _ => Err(UnknownRole(value)),
        }
    }
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub target_id: String,
    pub new_email: Option<String>,
    pub new_nickname: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Anything other than a JSON string is treated as "no title".
    #[serde(default)]
    pub title: Option<serde_json::Value>,
}

impl CreateSessionRequest {
    pub fn title(&self) -> Option<String> {
        match &self.title {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

impl PostMessageRequest {
    pub fn content(&self) -> String {
        match &self.content {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string().trim().to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub limit: Option<String>,
}

// Response views

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct LoginHistoryView {
    pub id: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserView,
    #[serde(rename = "loginHistory")]
    pub login_history: LoginHistoryView,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub user_id: String,
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateAccountResponse {
    pub message: String,
    pub user: AccountView,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ChatSession> for SessionView {
    fn from(session: &ChatSession) -> Self {
        SessionView {
            id: session.id.clone(),
            title: session.title.clone(),
            updated_at: session.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ChatMessage> for MessageView {
    fn from(message: &ChatMessage) -> Self {
        MessageView {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageExchange {
    #[serde(rename = "userMessage")]
    pub user_message: MessageView,
    #[serde(rename = "botMessage")]
    pub bot_message: MessageView,
}
