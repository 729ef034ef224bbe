//! User storage subsystem.
//!
//! The server only sees the [`UserStore`] capability. One store instance is
//! built at startup and shared by `Arc` with every handler on both protocols;
//! it must be safe under arbitrary concurrent use without outside locking.

pub mod memory;
pub mod model;

use async_trait::async_trait;

pub use memory::MemoryUserStore;
pub use model::{hash_password, verify_password, ListOptions, PasswordError, User, UserList};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("user '{0}' not found")]
    NotFound(String),
    #[error("user '{0}' already exists")]
    AlreadyExists(String),
    /// The backing store is closed or unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Account storage consumed by the protocol servers and auth strategies.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError>;

    async fn list(&self, options: ListOptions) -> Result<UserList, StoreError>;

    /// Insert a new account; `id` and `created_at` are assigned by the store.
    async fn create(&self, user: User) -> Result<User, StoreError>;

    async fn delete(&self, username: &str) -> Result<(), StoreError>;

    /// Release the store. Later calls fail with [`StoreError::Unavailable`].
    async fn close(&self) -> Result<(), StoreError>;
}
