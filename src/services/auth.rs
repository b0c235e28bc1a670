use crate::{
    data::{
        model::{
            AccountView, AuthResponse, LoginHistoryView, UpdateAccountRequest,
            UpdateAccountResponse, User, UserView,
        },
        password::verify_password,
        repository::{normalize_login_id, PasswordChange, UserPatch, UserRepository},
    },
    error::ApiError,
    services::token::SessionTokens,
};

/// Where a login came from, recorded in the login history.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

/// Turns verified credentials into a session token plus an audit row.
#[derive(Clone)]
pub struct AuthService {
    users: UserRepository,
    tokens: SessionTokens,
}

impl AuthService {
    pub fn new(users: UserRepository, tokens: SessionTokens) -> Self {
        Self { users, tokens }
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    pub async fn register(
        &self,
        login_id: &str,
        password: &str,
        nickname: &str,
        client: &ClientInfo,
    ) -> Result<AuthResponse, ApiError> {
        if login_id.trim().is_empty() || password.trim().is_empty() || nickname.trim().is_empty() {
            return Err(ApiError::bad_request(
                "user_id, password, nickname are required",
            ));
        }

        let user = self.users.create_user(login_id, password, nickname).await?;
        tracing::info!(user_id = %user.id, "account registered");
        self.start_session(&user, client).await
    }

    pub async fn login(
        &self,
        login_id: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<AuthResponse, ApiError> {
        if login_id.trim().is_empty() || password.is_empty() {
            return Err(ApiError::bad_request("Missing credentials"));
        }

        let user = self
            .users
            .find_by_login_id(login_id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

        if !user.is_active {
            return Err(ApiError::Forbidden("Inactive user".into()));
        }

        if !verify_password(password, &user.password_hash).await? {
            tracing::debug!(user_id = %user.id, "password mismatch");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }

        self.start_session(&user, client).await
    }

    async fn start_session(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<AuthResponse, ApiError> {
        let entry = self
            .users
            .record_login(&user.id, &client.ip_address, &client.user_agent)
            .await?;
        let token = self.tokens.issue(&user.id, &entry.id)?;

        Ok(AuthResponse {
            token,
            user: UserView {
                id: user.id.clone(),
                nickname: user.nickname.clone(),
            },
            login_history: LoginHistoryView {
                id: entry.id,
                logged_at: entry.logged_at,
            },
        })
    }

    pub async fn update_account(
        &self,
        request: UpdateAccountRequest,
    ) -> Result<UpdateAccountResponse, ApiError> {
        let user = self
            .users
            .find_by_login_id(&normalize_login_id(&request.target_id))
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let patch = UserPatch {
            nickname: request.new_nickname,
            login_id: request.new_email,
            password: request
                .new_password
                .filter(|p| !p.is_empty())
                .map(|new| PasswordChange {
                    current: request.current_password,
                    new,
                }),
        };

        let user = self.users.update_user(&user.id, patch).await?;
        tracing::info!(user_id = %user.id, "account updated");

        Ok(UpdateAccountResponse {
            message: "Account updated successfully".into(),
            user: AccountView {
                user_id: user.login_id,
                nickname: user.nickname,
            },
        })
    }
}
