use actix_web::{test, web, App};
use async_trait::async_trait;
use cms_server::auth::password::hash_password;
use cms_server::auth::{InMemorySessionStore, SessionEntry, SessionStore};
use cms_server::db::InMemoryUserStore;
use cms_server::error::StoreError;
use cms_server::{configure_routes, AppState, Settings, User, UserStore};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const EMAIL: &str = "a@example.com";
const PASSWORD: &str = "secret123";

/// In-memory store that can be switched off to simulate a Redis outage.
#[derive(Default)]
struct SwitchableSessionStore {
    inner: InMemorySessionStore,
    down: AtomicBool,
}

impl SwitchableSessionStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SwitchableSessionStore {
    async fn put(&self, token_id: &str, user_id: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(token_id, user_id, ttl).await
    }

    async fn put_all(&self, entries: &[SessionEntry]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put_all(entries).await
    }

    async fn get(&self, token_id: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.get(token_id).await
    }

    async fn delete(&self, token_id: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(token_id).await
    }

    async fn delete_all(&self, token_ids: &[String]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete_all(token_ids).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

async fn state_with<S: SessionStore + 'static>(sessions: Arc<S>) -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let users = Arc::new(InMemoryUserStore::new());
    let hash = hash_password(PASSWORD, 4).await.unwrap();
    users
        .create(&User::new("alice".into(), EMAIL.into(), hash))
        .await
        .unwrap();

    AppState::new(config, users, sessions).expect("Failed to build state")
}

async fn test_state() -> (AppState, Arc<InMemorySessionStore>) {
    let sessions = Arc::new(InMemorySessionStore::new());
    (state_with(sessions.clone()).await, sessions)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_login_then_access_protected_route() {
    let (state, sessions) = test_state().await;
    let app = app!(state);

    let login_response = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
        .send_request(&app)
        .await;
    assert_eq!(login_response.status(), 200);
    let body: Value = test::read_body_json(login_response).await;
    let access_token = body["access_token"].as_str().unwrap().to_string();
    assert!(body["refresh_token"].as_str().is_some());

    let protected = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {}", access_token)))
        .send_request(&app)
        .await;
    assert_eq!(protected.status(), 200);
    let me: Value = test::read_body_json(protected).await;
    assert_eq!(me["status"], true);
    let access_uuid = me["data"]["access_uuid"].as_str().unwrap().to_string();

    // Simulate revocation by removing the entry behind the caller's back.
    sessions.delete(&access_uuid).await.unwrap();

    let revoked = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", format!("Bearer {}", access_token)))
        .send_request(&app)
        .await;
    assert_eq!(revoked.status(), 401);
}

#[actix_web::test]
async fn test_invalid_login_responses_are_identical() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let unknown = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": "nobody@example.com", "password": PASSWORD }))
        .send_request(&app)
        .await;
    assert_eq!(unknown.status(), 401);
    let unknown_body: Value = test::read_body_json(unknown).await;

    let wrong = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": EMAIL, "password": "wrongpassword" }))
        .send_request(&app)
        .await;
    assert_eq!(wrong.status(), 401);
    let wrong_body: Value = test::read_body_json(wrong).await;

    assert_eq!(unknown_body, wrong_body);
    assert_eq!(wrong_body["status"], false);
    assert_eq!(wrong_body["code"], 401);
}

#[actix_web::test]
async fn test_login_with_malformed_body() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let missing_password = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": EMAIL }))
        .send_request(&app)
        .await;
    assert_eq!(missing_password.status(), 400);

    let empty_password = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": EMAIL, "password": "" }))
        .send_request(&app)
        .await;
    assert_eq!(empty_password.status(), 400);
}

#[actix_web::test]
async fn test_protected_routes_require_bearer() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let no_header = test::TestRequest::get().uri("/api/users").send_request(&app).await;
    assert_eq!(no_header.status(), 401);

    let malformed = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(("Authorization", "Bearer"))
        .send_request(&app)
        .await;
    assert_eq!(malformed.status(), 401);

    let garbage = test::TestRequest::get()
        .uri("/api/users")
        .insert_header(("Authorization", "Bearer not.a.jwt"))
        .send_request(&app)
        .await;
    assert_eq!(garbage.status(), 401);

    let malformed_body: Value = test::read_body_json(malformed).await;
    let garbage_body: Value = test::read_body_json(garbage).await;
    assert_eq!(malformed_body, garbage_body);
}

#[actix_web::test]
async fn test_logout_twice() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
            .to_request(),
    )
    .await;
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());

    for _ in 0..2 {
        let logout = test::TestRequest::post()
            .uri("/api/logout")
            .insert_header(("Authorization", bearer.clone()))
            .send_request(&app)
            .await;
        assert_eq!(logout.status(), 200);
    }

    let after = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", bearer))
        .send_request(&app)
        .await;
    assert_eq!(after.status(), 401);

    let anonymous = test::TestRequest::post().uri("/api/logout").send_request(&app).await;
    assert_eq!(anonymous.status(), 401);
}

#[actix_web::test]
async fn test_refresh_rotates_tokens() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
            .to_request(),
    )
    .await;
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    let refreshed = test::TestRequest::post()
        .uri("/api/token/refresh")
        .set_json(json!({ "refresh_token": refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(refreshed.status(), 201);
    let rotated: Value = test::read_body_json(refreshed).await;
    assert_ne!(rotated["access_token"], tokens["access_token"]);
    assert_ne!(rotated["refresh_token"], tokens["refresh_token"]);

    // The consumed refresh token cannot be replayed.
    let replay = test::TestRequest::post()
        .uri("/api/token/refresh")
        .set_json(json!({ "refresh_token": refresh_token }))
        .send_request(&app)
        .await;
    assert_eq!(replay.status(), 401);

    let rotated_refresh = test::TestRequest::post()
        .uri("/api/token/refresh")
        .set_json(json!({ "refresh_token": rotated["refresh_token"] }))
        .send_request(&app)
        .await;
    assert_eq!(rotated_refresh.status(), 201);

    let bad = test::TestRequest::post()
        .uri("/api/token/refresh")
        .set_json(json!({ "refresh_token": tokens["access_token"] }))
        .send_request(&app)
        .await;
    assert_eq!(bad.status(), 401);
}

#[actix_web::test]
async fn test_users_resource() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
            .to_request(),
    )
    .await;
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());

    let created = test::TestRequest::post()
        .uri("/api/users")
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({ "username": "bob", "email": "b@example.com", "password": "hunter22" }))
        .send_request(&app)
        .await;
    assert_eq!(created.status(), 201);
    let created: Value = test::read_body_json(created).await;
    assert!(created["data"].get("password_hash").is_none());
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let found = test::TestRequest::get()
        .uri(&format!("/api/users/{}", id))
        .insert_header(("Authorization", bearer.clone()))
        .send_request(&app)
        .await;
    assert_eq!(found.status(), 200);

    let duplicate = test::TestRequest::post()
        .uri("/api/users")
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({ "username": "bob", "email": "b@example.com", "password": "hunter22" }))
        .send_request(&app)
        .await;
    assert_eq!(duplicate.status(), 409);

    let invalid_id = test::TestRequest::get()
        .uri("/api/users/not-a-uuid")
        .insert_header(("Authorization", bearer.clone()))
        .send_request(&app)
        .await;
    assert_eq!(invalid_id.status(), 400);

    let listed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", bearer))
            .to_request(),
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 2);

    // The new account can log in.
    let login = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": "b@example.com", "password": "hunter22" }))
        .send_request(&app)
        .await;
    assert_eq!(login.status(), 200);
}

#[actix_web::test]
async fn test_update_and_delete_user() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
            .to_request(),
    )
    .await;
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());

    let created: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/users")
            .insert_header(("Authorization", bearer.clone()))
            .set_json(json!({ "username": "bob", "email": "b@example.com", "password": "hunter22" }))
            .to_request(),
    )
    .await;
    let uri = format!("/api/users/{}", created["data"]["id"].as_str().unwrap());

    let updated = test::TestRequest::put()
        .uri(&uri)
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({ "username": "robert", "password": "newpass99" }))
        .send_request(&app)
        .await;
    assert_eq!(updated.status(), 200);
    let updated: Value = test::read_body_json(updated).await;
    assert_eq!(updated["data"]["username"], "robert");
    assert_eq!(updated["data"]["email"], "b@example.com");
    assert!(updated["data"].get("password_hash").is_none());

    // The new password replaces the old one.
    let old_login = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": "b@example.com", "password": "hunter22" }))
        .send_request(&app)
        .await;
    assert_eq!(old_login.status(), 401);
    let new_login = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": "b@example.com", "password": "newpass99" }))
        .send_request(&app)
        .await;
    assert_eq!(new_login.status(), 200);

    let clash = test::TestRequest::put()
        .uri(&uri)
        .insert_header(("Authorization", bearer.clone()))
        .set_json(json!({ "email": EMAIL }))
        .send_request(&app)
        .await;
    assert_eq!(clash.status(), 409);

    let anonymous = test::TestRequest::delete().uri(&uri).send_request(&app).await;
    assert_eq!(anonymous.status(), 401);

    let deleted = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(("Authorization", bearer.clone()))
        .send_request(&app)
        .await;
    assert_eq!(deleted.status(), 200);

    let gone = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(("Authorization", bearer.clone()))
        .send_request(&app)
        .await;
    assert_eq!(gone.status(), 404);

    let missing_update = test::TestRequest::put()
        .uri(&uri)
        .insert_header(("Authorization", bearer))
        .set_json(json!({ "username": "ghost" }))
        .send_request(&app)
        .await;
    assert_eq!(missing_update.status(), 404);
}

#[actix_web::test]
async fn test_unknown_api_route_is_not_found() {
    let (state, _) = test_state().await;
    let app = app!(state);

    let unknown = test::TestRequest::get().uri("/api/nope").send_request(&app).await;
    assert_eq!(unknown.status(), 404);

    let protected = test::TestRequest::get().uri("/api/users").send_request(&app).await;
    assert_eq!(protected.status(), 401);
}

#[actix_web::test]
async fn test_login_while_store_is_down() {
    let sessions = Arc::new(SwitchableSessionStore::default());
    let state = state_with(sessions.clone()).await;
    let app = app!(state);

    sessions.set_down(true);
    let login = test::TestRequest::post()
        .uri("/api/login")
        .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
        .send_request(&app)
        .await;
    assert_eq!(login.status(), 503);
    let body: Value = test::read_body_json(login).await;
    assert_eq!(body["status"], false);
    assert_eq!(body["code"], 503);

    sessions.set_down(false);
    assert!(sessions.inner.is_empty().await);
}

#[actix_web::test]
async fn test_bearer_gate_reports_store_outage() {
    let sessions = Arc::new(SwitchableSessionStore::default());
    let state = state_with(sessions.clone()).await;
    let app = app!(state);

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/api/login")
            .set_json(json!({ "email": EMAIL, "password": PASSWORD }))
            .to_request(),
    )
    .await;
    let bearer = format!("Bearer {}", tokens["access_token"].as_str().unwrap());

    sessions.set_down(true);
    let outage = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", bearer.clone()))
        .send_request(&app)
        .await;
    assert_eq!(outage.status(), 503);

    sessions.set_down(false);
    let recovered = test::TestRequest::get()
        .uri("/api/me")
        .insert_header(("Authorization", bearer))
        .send_request(&app)
        .await;
    assert_eq!(recovered.status(), 200);
}
