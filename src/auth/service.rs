use crate::auth::password::verify_password;
use crate::auth::session::{SessionEntry, SessionStore};
use crate::auth::token::{AccessClaims, SessionTokenPair, TokenCodec};
use crate::db::UserStore;
use crate::error::{AppError, AuthError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tokens handed back to the client after login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl From<SessionTokenPair> for TokenResponse {
    fn from(pair: SessionTokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }
    }
}

/// Store key recording which access token a refresh token was issued with.
pub fn refresh_link_key(refresh_id: &str) -> String {
    format!("{}:access", refresh_id)
}

/// Returns the token part of an `Authorization: Bearer <token>` header, or
/// an empty string when the header does not have exactly two parts.
pub fn extract_bearer(header: &str) -> &str {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(token), None) => token,
        _ => "",
    }
}

/// Login, logout, refresh and request verification on top of the token
/// codec and the session store.
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    codec: TokenCodec,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>, codec: TokenCodec) -> Self {
        Self {
            users,
            sessions,
            codec,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AppError> {
        let user = match self.users.find_by_email(email).await? {
            Some(user) => user,
            None => {
                debug!("Login rejected: no account for {}", email);
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !verify_password(password, &user.password_hash).await? {
            debug!("Login rejected: wrong password for user {}", user.id);
            return Err(AuthError::InvalidCredentials.into());
        }

        let pair = self.start_session(&user.id.to_string()).await?;
        info!("User {} logged in (access id {})", pair.user_id, pair.access_token_id);
        Ok(pair.into())
    }

    /// Revokes the access token carried by `bearer`. Revoking an already
    /// revoked token succeeds.
    pub async fn logout(&self, bearer: &str) -> Result<(), AppError> {
        let claims = self.codec.decode_access(bearer).map_err(|e| {
            warn!("Logout with unusable token: {}", e);
            AuthError::Unauthorized
        })?;

        self.sessions.delete(&claims.access_uuid).await?;
        info!("User {} logged out (access id {})", claims.user_id, claims.access_uuid);
        Ok(())
    }

    pub async fn verify(&self, bearer: &str) -> Result<AccessClaims, AppError> {
        let claims = self.codec.decode_access(bearer).map_err(|e| {
            debug!("Rejected access token: {}", e);
            AuthError::Unauthorized
        })?;

        match self.sessions.get(&claims.access_uuid).await? {
            Some(_) => Ok(claims),
            None => {
                debug!("Access id {} is not in the session store", claims.access_uuid);
                Err(AuthError::Unauthorized.into())
            }
        }
    }

    /// Consumes a refresh token and issues a new pair.
    ///
    /// The access token issued alongside the old refresh token is left alone
    /// and stays valid until it expires on its own.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let claims = self.codec.decode_refresh(refresh_token).map_err(|e| {
            warn!("Rejected refresh token: {}", e);
            AuthError::RefreshTokenExpired
        })?;

        // A consumed or revoked refresh id must not mint another pair.
        match self.sessions.get(&claims.refresh_uuid).await? {
            Some(owner) if owner == claims.user_id => {}
            _ => {
                warn!("Refresh id {} is not live in the session store", claims.refresh_uuid);
                return Err(AuthError::RefreshTokenExpired.into());
            }
        }

        let link_key = refresh_link_key(&claims.refresh_uuid);
        if let Err(e) = self
            .sessions
            .delete_all(&[claims.refresh_uuid.clone(), link_key])
            .await
        {
            warn!("Failed to delete rotated refresh id {}: {}", claims.refresh_uuid, e);
        }

        let pair = self.start_session(&claims.user_id).await?;
        info!(
            "Refreshed session for user {} (new access id {})",
            pair.user_id, pair.access_token_id
        );
        Ok(pair.into())
    }

    async fn start_session(&self, user_id: &str) -> Result<SessionTokenPair, AppError> {
        let pair = self.codec.issue(user_id)?;

        let entries = [
            SessionEntry::expiring_at(&pair.access_token_id, user_id, pair.access_expiry),
            SessionEntry::expiring_at(&pair.refresh_token_id, user_id, pair.refresh_expiry),
            SessionEntry::expiring_at(
                refresh_link_key(&pair.refresh_token_id),
                &pair.access_token_id,
                pair.refresh_expiry,
            ),
        ];
        self.sessions
            .put_all(&entries)
            .await
            .map_err(AuthError::SessionPersist)?;

        Ok(pair)
    }
}
