//! bcrypt glue. Hashing is CPU bound, so both directions run on the
//! blocking pool instead of the async workers.

use crate::error::AppError;

pub async fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let outcome = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::InternalError(format!("password verification task failed: {}", e)))?;

    match outcome {
        Ok(matches) => Ok(matches),
        // A malformed stored hash can never match; treat it as a mismatch.
        Err(
            bcrypt::BcryptError::InvalidHash(_)
            | bcrypt::BcryptError::InvalidPrefix(_)
            | bcrypt::BcryptError::InvalidCost(_)
            | bcrypt::BcryptError::InvalidBase64(_),
        ) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    let password = password.to_owned();
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::InternalError(format!("password hashing task failed: {}", e)))??;
    Ok(hashed)
}
