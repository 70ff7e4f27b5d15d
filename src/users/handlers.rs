use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::auth::AuthenticatedUser;
use crate::db::User;
use crate::error::{AppError, DatabaseError};
use crate::response::ApiResponse;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl CreateUserRequest {
    fn validate(&self) -> Result<(), AppError> {
        if self.username.trim().is_empty() {
            return Err(AppError::ValidationError("username is required".into()));
        }
        if self.password.is_empty() {
            return Err(AppError::ValidationError("password is required".into()));
        }
        validate_email(&self.email)
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

impl UpdateUserRequest {
    fn validate(&self) -> Result<(), AppError> {
        if matches!(&self.username, Some(name) if name.trim().is_empty()) {
            return Err(AppError::ValidationError("username is required".into()));
        }
        if matches!(&self.password, Some(password) if password.is_empty()) {
            return Err(AppError::ValidationError("password is required".into()));
        }
        match &self.email {
            Some(email) => validate_email(email),
            None => Ok(()),
        }
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AppError::ValidationError("email is not valid email".into())),
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::ValidationError("Invalid ID".into()))
}

#[derive(Debug, Serialize)]
pub struct CurrentUser {
    pub user_id: String,
    pub access_uuid: String,
    pub expires_at: i64,
}

pub async fn create_user(
    req: web::Json<CreateUserRequest>,
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    req.validate()?;

    let password_hash = hash_password(&req.password, state.config.auth.bcrypt_cost).await?;
    let user = User::new(req.username.trim().to_string(), req.email.trim().to_string(), password_hash);
    let created = state.users.create(&user).await?;

    info!("User {} created account {}", caller.0.user_id, created.id);
    Ok(ApiResponse::new(StatusCode::CREATED, created, "Record saved successfully").into_response())
}

pub async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let users = state.users.list().await?;
    Ok(ApiResponse::new(StatusCode::OK, users, "").into_response())
}

pub async fn find_user(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = parse_id(&path.into_inner())?;

    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(DatabaseError::NotFound)?;

    Ok(ApiResponse::new(StatusCode::OK, user, "").into_response())
}

pub async fn update_user(
    path: web::Path<String>,
    req: web::Json<UpdateUserRequest>,
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let id = parse_id(&path.into_inner())?;
    req.validate()?;

    let mut user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or(DatabaseError::NotFound)?;

    let UpdateUserRequest { username, email, password } = req.into_inner();
    if let Some(username) = username {
        user.username = username.trim().to_string();
    }
    if let Some(email) = email {
        user.email = email.trim().to_string();
    }
    if let Some(password) = password {
        user.password_hash = hash_password(&password, state.config.auth.bcrypt_cost).await?;
    }
    user.updated_at = Utc::now();

    let updated = state.users.update(&user).await?;
    info!("User {} updated account {}", caller.0.user_id, updated.id);
    Ok(ApiResponse::new(StatusCode::OK, updated, "Updated").into_response())
}

pub async fn delete_user(
    path: web::Path<String>,
    state: web::Data<AppState>,
    caller: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let id = parse_id(&path.into_inner())?;
    state.users.delete(id).await?;

    info!("User {} deleted account {}", caller.0.user_id, id);
    Ok(ApiResponse::new(StatusCode::OK, (), "Deleted").into_response())
}

pub async fn me(caller: AuthenticatedUser) -> HttpResponse {
    let AuthenticatedUser(claims) = caller;
    ApiResponse::new(
        StatusCode::OK,
        CurrentUser {
            user_id: claims.user_id,
            access_uuid: claims.access_uuid,
            expires_at: claims.exp,
        },
        "",
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_validate_create_request() {
        assert!(request("alice", "a@example.com", "secret123").validate().is_ok());
        assert!(request("", "a@example.com", "secret123").validate().is_err());
        assert!(request("alice", "a@example.com", "").validate().is_err());
        assert!(request("alice", "not-an-email", "secret123").validate().is_err());
        assert!(request("alice", "@example.com", "secret123").validate().is_err());
    }

    #[test]
    fn test_validate_update_request() {
        let update = |username: Option<&str>, email: Option<&str>, password: Option<&str>| UpdateUserRequest {
            username: username.map(Into::into),
            email: email.map(Into::into),
            password: password.map(Into::into),
        };

        assert!(update(None, None, None).validate().is_ok());
        assert!(update(Some("bob"), Some("b@example.com"), Some("hunter22")).validate().is_ok());
        assert!(update(Some(" "), None, None).validate().is_err());
        assert!(update(None, Some("nope"), None).validate().is_err());
        assert!(update(None, None, Some("")).validate().is_err());
    }
}
