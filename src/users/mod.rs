//! `/api/users` resource. Every route here sits behind the bearer gate.

pub mod handlers;

pub use handlers::{create_user, delete_user, find_user, list_users, me, update_user};
