//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use user_apiserver::config::{SeedUser, ServerConfig, StrategyKind};
use user_apiserver::store::{
    hash_password, ListOptions, MemoryUserStore, StoreError, User, UserList, UserStore,
};

pub const PASSWORD: &str = "secret";

/// Config on fixed local ports with signal handling off and short drains.
pub fn test_config(http_port: u16, rpc_port: u16) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.http.bind_address = format!("127.0.0.1:{http_port}");
    config.http.drain_timeout_secs = 2;
    config.rpc.bind_address = format!("127.0.0.1:{rpc_port}");
    config.rpc.drain_timeout_secs = Some(5);
    config.shutdown.handle_signals = false;
    config.auth.strategy = StrategyKind::Auto;
    config.auth.signing_key = "integration-test-key".into();
    config.users = seed_users(&["alice", "bob"]);
    config
}

pub fn seed_users(names: &[&str]) -> Vec<SeedUser> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| SeedUser {
            name: name.to_string(),
            email: Some(format!("{name}@example.com")),
            password_hash: hash_password(PASSWORD).unwrap(),
            discord_id: 1000 + i as u64,
            total_credits: 10 * (i as i64 + 1),
        })
        .collect()
}

pub fn seeded_store(config: &ServerConfig) -> Arc<MemoryUserStore> {
    Arc::new(MemoryUserStore::with_seed_users(&config.users))
}

pub fn addr(address: &str) -> SocketAddr {
    address.parse().unwrap()
}

/// Poll until `addr` accepts connections.
pub async fn wait_for_port(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{addr} never started accepting");
}

/// Poll until `addr` refuses connections, within `within`.
pub async fn wait_until_refused(addr: SocketAddr, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if TcpStream::connect(addr).await.is_err() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Store whose `close` fails, counting how often it was called.
pub struct FailingCloseStore {
    pub inner: MemoryUserStore,
    pub close_calls: AtomicUsize,
}

impl FailingCloseStore {
    pub fn new(inner: MemoryUserStore) -> Arc<Self> {
        Arc::new(Self {
            inner,
            close_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl UserStore for FailingCloseStore {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.inner.get_by_username(username).await
    }

    async fn list(&self, options: ListOptions) -> Result<UserList, StoreError> {
        self.inner.list(options).await
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        self.inner.create(user).await
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        self.inner.delete(username).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("connection reset during close".into()))
    }
}

/// Store whose lookups signal `entered` and then take `delay`.
pub struct SlowLookupStore {
    pub inner: MemoryUserStore,
    pub entered: Notify,
    pub delay: Duration,
}

impl SlowLookupStore {
    pub fn new(inner: MemoryUserStore, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner,
            entered: Notify::new(),
            delay,
        })
    }
}

#[async_trait]
impl UserStore for SlowLookupStore {
    async fn get_by_username(&self, username: &str) -> Result<User, StoreError> {
        self.entered.notify_one();
        tokio::time::sleep(self.delay).await;
        self.inner.get_by_username(username).await
    }

    async fn list(&self, options: ListOptions) -> Result<UserList, StoreError> {
        self.inner.list(options).await
    }

    async fn create(&self, user: User) -> Result<User, StoreError> {
        self.inner.create(user).await
    }

    async fn delete(&self, username: &str) -> Result<(), StoreError> {
        self.inner.delete(username).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.inner.close().await
    }
}
