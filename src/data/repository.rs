use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::model::{ChatMessage, ChatSession, LoginHistory, MessageRole, User};
use super::password::{hash_password, verify_password};
use crate::data::database::Database;
use crate::error::ApiError;

const USER_COLUMNS: &str =
    "id, login_id, password_hash, nickname, is_active, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, user_id, login_history_id, title, is_archived, created_at, updated_at";
const MESSAGE_COLUMNS: &str =
    "id, session_id, user_id, role, content, model_input_id, created_at";

/// Login identifiers are compared trimmed and lower-cased everywhere.
pub fn normalize_login_id(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Partial account update. `None` leaves the field untouched.
#[derive(Debug, Default)]
pub struct UserPatch {
    pub nickname: Option<String>,
    pub login_id: Option<String>,
    pub password: Option<PasswordChange>,
}

#[derive(Debug)]
pub struct PasswordChange {
    pub current: Option<String>,
    pub new: String,
}

/// Users and their login history.
#[derive(Clone)]
pub struct UserRepository {
    pub db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn create_user(
        &self,
        login_id: &str,
        password: &str,
        nickname: &str,
    ) -> Result<User, ApiError> {
        let login_id = normalize_login_id(login_id);
        if self.find_by_login_id(&login_id).await?.is_some() {
            return Err(ApiError::Conflict("User already exists".into()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            login_id,
            password_hash: hash_password(password).await?,
            nickname: nickname.trim().to_string(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        // The unique index settles a race between two registrations.
        sqlx::query(
            "INSERT INTO users (id, login_id, password_hash, nickname, is_active, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&user.id)
        .bind(&user.login_id)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("User already exists".into())
            } else {
                ApiError::Database(e)
            }
        })?;

        tracing::debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn find_by_login_id(&self, login_id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE login_id = ?1",
            USER_COLUMNS
        ))
        .bind(normalize_login_id(login_id))
        .fetch_optional(self.db.pool())
        .await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await
    }

    /// Apply `patch` to the user and persist all changes in one statement.
    pub async fn update_user(&self, id: &str, patch: UserPatch) -> Result<User, ApiError> {
        let mut user = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if let Some(nickname) = patch.nickname {
            let nickname = nickname.trim();
            if !nickname.is_empty() {
                user.nickname = nickname.to_string();
            }
        }

        if let Some(change) = patch.password {
            let current = change.current.unwrap_or_default();
            if current.is_empty() || !verify_password(&current, &user.password_hash).await? {
                return Err(ApiError::unauthorized("Current password does not match"));
            }
            user.password_hash = hash_password(&change.new).await?;
        }

        if let Some(login_id) = patch.login_id {
            let login_id = normalize_login_id(&login_id);
            if !login_id.is_empty() && login_id != user.login_id {
                if self.find_by_login_id(&login_id).await?.is_some() {
                    return Err(ApiError::Conflict("Login id already in use".into()));
                }
                user.login_id = login_id;
            }
        }

        user.updated_at = Utc::now();
        sqlx::query(
            "UPDATE users SET login_id = ?1, password_hash = ?2, nickname = ?3, updated_at = ?4 \
             WHERE id = ?5",
        )
        .bind(&user.login_id)
        .bind(&user.password_hash)
        .bind(&user.nickname)
        .bind(user.updated_at)
        .bind(&user.id)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Login id already in use".into())
            } else {
                ApiError::Database(e)
            }
        })?;

        Ok(user)
    }

    pub async fn record_login(
        &self,
        user_id: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<LoginHistory, sqlx::Error> {
        let entry = LoginHistory {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            logged_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO login_history (id, user_id, ip_address, user_agent, logged_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.logged_at)
        .execute(self.db.pool())
        .await?;

        Ok(entry)
    }

    pub async fn count_logins(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM login_history WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(self.db.pool())
                .await?;
        Ok(count)
    }

    #[cfg(test)]
    pub async fn set_active(&self, user_id: &str, active: bool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(user_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}

/// Chat sessions and their append-only message logs.
#[derive(Clone)]
pub struct ChatRepository {
    pub db: Arc<Database>,
}

impl ChatRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Non-archived sessions of `user_id`, most recently active first.
    pub async fn list_sessions(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatSession>, sqlx::Error> {
        sqlx::query_as::<_, ChatSession>(&format!(
            "SELECT {} FROM chat_sessions WHERE user_id = ?1 AND is_archived = 0 \
             ORDER BY updated_at DESC, rowid DESC LIMIT ?2",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        login_history_id: Option<&str>,
        title: Option<String>,
    ) -> Result<ChatSession, sqlx::Error> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            login_history_id: login_history_id.map(str::to_string),
            title,
            is_archived: false,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO chat_sessions (id, user_id, login_history_id, title, is_archived, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.login_history_id)
        .bind(&session.title)
        .bind(session.is_archived)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(session)
    }

    /// The session, provided it exists, belongs to `user_id` and is not archived.
    pub async fn find_active_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<ChatSession>, sqlx::Error> {
        sqlx::query_as::<_, ChatSession>(&format!(
            "SELECT {} FROM chat_sessions WHERE id = ?1 AND user_id = ?2 AND is_archived = 0",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await
    }

    pub async fn insert_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, sqlx::Error> {
        let message = ChatMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            model_input_id: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO chat_messages (id, session_id, user_id, role, content, model_input_id, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&message.id)
        .bind(&message.session_id)
        .bind(&message.user_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.model_input_id)
        .bind(message.created_at)
        .execute(self.db.pool())
        .await?;

        Ok(message)
    }

    /// Oldest-first messages of the session written by `user_id`, at most `limit`.
    pub async fn list_messages(
        &self,
        session_id: &str,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {} FROM chat_messages WHERE session_id = ?1 AND user_id = ?2 \
             ORDER BY created_at ASC, rowid ASC LIMIT ?3",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await
    }

    /// The newest `limit` messages of the session, returned oldest-first.
    pub async fn recent_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let mut messages = sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {} FROM chat_messages WHERE session_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        messages.reverse();
        Ok(messages)
    }

    pub async fn touch_session(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_sessions SET updated_at = ?1 WHERE id = ?2")
            .bind(at)
            .bind(session_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn archive_session(&self, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE chat_sessions SET is_archived = 1 WHERE id = ?1")
            .bind(session_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }
}
