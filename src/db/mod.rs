//! User persistence.
//!
//! The auth layer only needs to look accounts up by email; the rest of the
//! trait backs the `/api/users` resource.

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;

pub use memory::InMemoryUserStore;
pub use models::User;
pub use operations::DbOperations;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError>;
    async fn list(&self) -> Result<Vec<User>, DatabaseError>;
    async fn create(&self, user: &User) -> Result<User, DatabaseError>;
    /// Overwrites the stored row with the same id. Unknown ids are `NotFound`.
    async fn update(&self, user: &User) -> Result<User, DatabaseError>;
    async fn delete(&self, id: Uuid) -> Result<(), DatabaseError>;
}
