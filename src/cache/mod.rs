//! Background connection to the optional Redis cache.
//!
//! The connection is established off the startup path: the servers start
//! serving while the connect loop retries with backoff. Shutdown cancels the
//! loop through a [`CancellationToken`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use rand::Rng;
use redis::aio::MultiplexedConnection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::CacheConfig;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid cache url: {0}")]
    InvalidUrl(#[from] redis::RedisError),
}

/// Shared handle to the cache connection.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<Inner>,
}

struct Inner {
    client: redis::Client,
    connection: ArcSwapOption<MultiplexedConnection>,
    started: AtomicBool,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl CacheClient {
    /// `None` when no cache is configured.
    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>, CacheError> {
        let Some(url) = &config.url else {
            return Ok(None);
        };
        let client = redis::Client::open(url.as_str())?;
        Ok(Some(Self {
            inner: Arc::new(Inner {
                client,
                connection: ArcSwapOption::empty(),
                started: AtomicBool::new(false),
                base_delay_ms: config.base_delay_ms,
                max_delay_ms: config.max_delay_ms,
            }),
        }))
    }

    /// Spawn the connect loop. Runs until connected or `token` is cancelled.
    /// Returns `None` if the loop was already started.
    pub fn connect_in_background(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return None;
        }
        let inner = self.inner.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Cache connect cancelled");
                }
                _ = inner.connect_loop() => {}
            }
        }))
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connection.load().is_some()
    }

    /// A clone of the live connection, if established.
    pub fn connection(&self) -> Option<MultiplexedConnection> {
        self.inner.connection.load_full().map(|c| (*c).clone())
    }
}

impl Inner {
    async fn connect_loop(&self) {
        let mut attempt = 0u32;
        loop {
            match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => {
                    self.connection.store(Some(Arc::new(conn)));
                    tracing::info!(attempts = attempt + 1, "Cache connected");
                    return;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.retry_delay(attempt);
                    tracing::warn!(attempt, delay = ?delay, error = %e, "Cache connect failed");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Wait after the `attempt`-th failure: `base_delay_ms` doubled per
    /// failure and clamped to `max_delay_ms`, with the last tenth randomized.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1);
        let ceiling = 1u64
            .checked_shl(doublings)
            .map_or(u64::MAX, |factor| self.base_delay_ms.saturating_mul(factor))
            .min(self.max_delay_ms);
        let spread = ceiling / 10;
        let floor = ceiling - spread;
        if spread == 0 {
            return Duration::from_millis(ceiling);
        }
        Duration::from_millis(floor + rand::thread_rng().gen_range(0..=spread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: Option<&str>) -> CacheConfig {
        CacheConfig {
            url: url.map(str::to_string),
            base_delay_ms: 10,
            max_delay_ms: 50,
        }
    }

    #[test]
    fn no_url_means_no_cache() {
        assert!(CacheClient::from_config(&config(None)).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_scheme() {
        assert!(CacheClient::from_config(&config(Some("ftp://localhost"))).is_err());
    }

    #[tokio::test]
    async fn cancel_stops_connect_loop() {
        let cache = CacheClient::from_config(&config(Some("redis://127.0.0.1:1/")))
            .unwrap()
            .unwrap();
        let token = CancellationToken::new();

        let handle = cache.connect_in_background(token.clone()).unwrap();
        assert!(cache.connect_in_background(token.clone()).is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("connect loop should stop after cancel")
            .unwrap();
        assert!(!cache.is_connected());
        assert!(cache.connection().is_none());
    }

    fn inner(base_delay_ms: u64, max_delay_ms: u64) -> Inner {
        Inner {
            client: redis::Client::open("redis://127.0.0.1:1/").unwrap(),
            connection: ArcSwapOption::empty(),
            started: AtomicBool::new(false),
            base_delay_ms,
            max_delay_ms,
        }
    }

    #[test]
    fn retry_delay_grows_until_clamped() {
        let inner = inner(100, 2000);
        for _ in 0..20 {
            assert!((90..=100).contains(&inner.retry_delay(1).as_millis()));
            assert!((360..=400).contains(&inner.retry_delay(3).as_millis()));
            assert!((1800..=2000).contains(&inner.retry_delay(6).as_millis()));
            assert!((1800..=2000).contains(&inner.retry_delay(u32::MAX).as_millis()));
        }
    }

    #[test]
    fn tiny_delays_are_exact() {
        let inner = inner(5, 9);
        assert_eq!(inner.retry_delay(1), Duration::from_millis(5));
        assert_eq!(inner.retry_delay(2), Duration::from_millis(9));
    }
}
