pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod response;
pub mod users;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use crate::config::Settings;

pub use auth::{AuthService, SessionStore, TokenCodec};
pub use db::{DbOperations, User, UserStore};

use auth::handlers::{login, logout, refresh};
use auth::RequireAuth;
use users::{create_user, delete_user, find_user, list_users, me, update_user};

/// Health check endpoint handler
/// Reports server status, timestamp and whether the session store answers
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let session_store = match state.auth_service.sessions().ping().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::warn!("Session store health check failed: {}", e);
            "down"
        }
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": if session_store == "up" { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "session_store": session_store,
    }))
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    /// Wires the services together from already connected stores. Connection
    /// lifecycle stays with the caller.
    pub fn new(
        config: Settings,
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        // Unusable token keys fail here, before any route is served
        let codec = TokenCodec::new(&config.auth)?;

        // Stores are shared between the auth service and the handlers
        let auth_service = AuthService::new(users.clone(), sessions, codec);

        Ok(Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            users,
        })
    }
}

/// Registers every route. `/api/login`, `/api/logout` and
/// `/api/token/refresh` are public; the other `/api` resources require a
/// live access token. Unknown paths fall through to 404.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into()),
    )
    .route("/health", web::get().to(health_check))
    .service(
        web::scope("/api")
            .route("/login", web::post().to(login))
            .route("/logout", web::post().to(logout))
            .route("/token/refresh", web::post().to(refresh))
            // Protected resources, each wrapped on its own
            .service(
                web::resource("/me")
                    .wrap(RequireAuth)
                    .route(web::get().to(me)),
            )
            .service(
                web::resource("/users")
                    .wrap(RequireAuth)
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{id}")
                    .wrap(RequireAuth)
                    .route(web::get().to(find_user))
                    .route(web::put().to(update_user))
                    .route(web::delete().to(delete_user)),
            ),
    );
}
