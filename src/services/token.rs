use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Tokens are valid for seven days after issuance.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// JWT claims embedded in session tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "loginHistoryId")]
    pub login_history_id: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionTokens {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl SessionTokens {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn issue(&self, user_id: &str, login_history_id: &str) -> Result<String, ApiError> {
        self.issue_at(user_id, login_history_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        user_id: &str,
        login_history_id: &str,
        issued_at: DateTime<Utc>,
    ) -> Result<String, ApiError> {
        let claims = SessionClaims {
            user_id: user_id.to_string(),
            login_history_id: login_history_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::days(TOKEN_TTL_DAYS)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("failed to sign session token: {}", e)))
    }

    /// Checks signature and expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, ApiError> {
        decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected session token");
                ApiError::unauthorized("Invalid token")
            })
    }
}
