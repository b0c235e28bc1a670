use crate::error::ApiError;

/// Work factor for new hashes. Tests use the bcrypt minimum to stay fast.
pub const HASH_COST: u32 = if cfg!(test) { 4 } else { 10 };

pub async fn hash_password(password: &str) -> Result<String, ApiError> {
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, HASH_COST))
        .await
        .map_err(|e| ApiError::Internal(format!("hashing task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Constant-time comparison is done inside `bcrypt::verify`.
pub async fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task failed: {}", e)))?
        .map_err(ApiError::from)
}
