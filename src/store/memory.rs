//! Concurrent in-memory user store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{ListOptions, StoreError, User, UserList, UserStore};
use crate::config::SeedUser;

/// [`UserStore`] backed by a sharded concurrent map keyed by user name.
#[derive(Debug)]
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Build a store holding the configured seed accounts.
    pub fn with_seed_users(seeds: &[SeedUser]) -> Self {
        let store = Self::new();
        for seed in seeds {
            let user = User {
                id: store.next_id.fetch_add(1, Ordering::Relaxed),
                name: seed.name.clone(),
                email: seed.email.clone(),
                password: seed.password_hash.clone(),
                discord_id: seed.discord_id,
                total_credits: seed.total_credits,
                created_at: Utc::now(),
            };
            store.users.insert(user.name.clone(), user);
        }
        tracing::info!(users = store.users.len(), "User store seeded");
        store
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Unavailable("store is closed".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.ensure_open()?;
        self.users
            .get(username)
            .map(|u| u.clone())
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    async fn list(&self, options: ListOptions) -> Result<UserList, StoreError> {
        self.ensure_open()?;
        let mut items: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        let total_count = items.len() as u64;
        // Newest first, matching `ORDER BY id DESC`.
        items.sort_unstable_by(|a, b| b.id.cmp(&a.id));
        let items = items
            .into_iter()
            .skip(options.offset())
            .take(options.limit())
            .collect();
        Ok(UserList { total_count, items })
    }

    async fn create(&self, mut user: User) -> Result<User, StoreError> {
        self.ensure_open()?;
        match self.users.entry(user.name.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(user.name)),
            Entry::Vacant(slot) => {
                user.id = self.next_id.fetch_add(1, Ordering::Relaxed);
                user.created_at = Utc::now();
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.users
            .remove(username)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("User store closed");
        }
        Ok(())
    }
}
