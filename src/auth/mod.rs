//! Session-token authentication.
//!
//! Access and refresh tokens are HMAC-signed JWTs. Their identifiers are
//! registered in a [`SessionStore`]; a token is only honoured while its
//! identifier is present there.

pub mod handlers;
pub mod middleware;
pub mod password;
pub mod service;
pub mod session;
pub mod token;

pub use middleware::{AuthenticatedUser, RequireAuth};
pub use service::{extract_bearer, AuthService, TokenResponse};
pub use session::{InMemorySessionStore, RedisSessionStore, SessionEntry, SessionStore};
pub use token::{AccessClaims, RefreshClaims, SessionTokenPair, TokenCodec};
