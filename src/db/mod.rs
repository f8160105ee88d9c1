//! Persistence for users, their posts and login sessions.
//!
//! Handlers only see the collaborator traits below; `postgres` backs them with
//! sqlx, `memory` keeps everything in-process.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;

pub use memory::MemoryStore;
pub use models::{Page, Post, User, UserSession};
pub use postgres::DbOperations;

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

/// The user directory. Writes fail with `DatabaseError::Duplicate` when a
/// username or e-mail is already taken.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;
    async fn create(&self, user: &User) -> DbResult<User>;
    async fn update(&self, user: &User) -> DbResult<User>;
    /// Removes the user together with their sessions and posts.
    async fn delete(&self, id: Uuid) -> DbResult<()>;
}

#[async_trait]
pub trait PostDirectory: Send + Sync {
    async fn create(&self, post: &Post) -> DbResult<Post>;
    /// `page` is 1-based; posts come newest first.
    async fn page_by_author(&self, user_id: Uuid, page: u32, per_page: u32) -> DbResult<Page<Post>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &UserSession) -> DbResult<UserSession>;
    async fn get_session_by_token(&self, token: &str) -> DbResult<Option<UserSession>>;
    async fn update_session_activity(&self, token: &str) -> DbResult<()>;
    async fn delete_session(&self, token: &str) -> DbResult<()>;
    async fn cleanup_expired_sessions(&self) -> DbResult<u64>;
}
