//! Startup orchestration: the dual-protocol server composite.
//!
//! # Responsibilities
//! - Construct both protocol servers around one shared store and cache
//! - Install routes, start the cache connect loop, register cleanup
//! - Bind both listeners, start shutdown managers, serve HTTP to the end
//!
//! # Design Decisions
//! - Fail fast: a bind or TLS error aborts before the server is running
//! - Cleanup order: RPC close, HTTP close, cache cancel, store close, so
//!   listeners drain before the store they use is released
//! - `run` returns the aggregated shutdown result; exiting is up to `main`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::auth::{AllowAll, AuthState, AuthStrategy, Authorizer, BasicStrategy, StaticPolicy, TokenStrategy};
use crate::cache::CacheClient;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::http::{self, AppState, HttpServer};
use crate::lifecycle::managers::{ShutdownManager, SignalManager};
use crate::lifecycle::shutdown::{ShutdownCoordinator, ShutdownError};
use crate::rpc::RpcServer;
use crate::store::UserStore;

/// Linear composite lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Constructed,
    Prepared,
    Running,
    Stopped,
}

/// Both protocol servers plus the resources they share.
pub struct ApiServer {
    config: ServerConfig,
    coordinator: ShutdownCoordinator,
    store: Arc<dyn UserStore>,
    cache: Option<CacheClient>,
    http: Arc<HttpServer>,
    rpc: Arc<RpcServer>,
    state: watch::Sender<ServerState>,
}

impl ApiServer {
    /// Construct the composite. TLS material for both listeners is loaded
    /// here; nothing is bound yet.
    pub async fn new(config: ServerConfig, store: Arc<dyn UserStore>) -> Result<Self, ServerError> {
        let coordinator = ShutdownCoordinator::new();
        if config.shutdown.handle_signals {
            coordinator.add_shutdown_manager(SignalManager::new())?;
        }

        let http = Arc::new(HttpServer::new(config.http.clone()).await?);
        let rpc = Arc::new(RpcServer::new(config.rpc.clone(), store.clone())?);
        let cache = CacheClient::from_config(&config.cache)?;

        Ok(Self {
            config,
            coordinator,
            store,
            cache,
            http,
            rpc,
            state: watch::channel(ServerState::Constructed).0,
        })
    }

    pub fn add_shutdown_manager(&self, manager: Arc<dyn ShutdownManager>) -> Result<(), ShutdownError> {
        self.coordinator.add_shutdown_manager(manager)
    }

    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.coordinator
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Wire handlers, start the cache connect loop and register cleanup.
    pub fn prepare_run(self) -> Result<PreparedApiServer, ServerError> {
        let auth = &self.config.auth;
        let basic = BasicStrategy::new(self.store.clone());
        let tokens = TokenStrategy::from_config(auth);
        let strategy = AuthStrategy::new(auth.strategy, basic.clone(), tokens.clone());

        let authorizer: Arc<dyn Authorizer> = if auth.policy.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(StaticPolicy::from_rules(&auth.policy)?)
        };

        let auth_state = AuthState {
            strategy: Arc::new(strategy),
            authorizer,
            realm: auth.realm.clone(),
            max_body: self.config.http.max_body_size,
        };
        let app_state = AppState {
            store: self.store.clone(),
            basic,
            tokens,
            cache: self.cache.clone(),
            realm: auth.realm.clone(),
            send_cookie: auth.send_cookie,
            secure_cookie: self.config.http.tls.is_some(),
        };
        self.http.install_routes(http::routes(app_state, auth_state));
        tracing::info!(strategy = %auth.strategy, "Routes installed");

        let cache_token = CancellationToken::new();
        if let Some(cache) = &self.cache {
            cache.connect_in_background(cache_token.clone());
        }

        let rpc = self.rpc.clone();
        self.coordinator
            .add_shutdown_callback("rpc-close", move |_| async move { rpc.close().await })?;

        let http = self.http.clone();
        self.coordinator
            .add_shutdown_callback("http-close", move |_| async move { http.close().await })?;

        self.coordinator.add_shutdown_callback("cache-cancel", move |_| async move {
            cache_token.cancel();
            Ok::<(), std::convert::Infallible>(())
        })?;

        let store = self.store.clone();
        self.coordinator
            .add_shutdown_callback("store-close", move |_| async move { store.close().await })?;

        self.state.send_replace(ServerState::Prepared);
        Ok(PreparedApiServer { server: self })
    }
}

/// An [`ApiServer`] whose routes and cleanup are wired; only `run` remains.
pub struct PreparedApiServer {
    server: ApiServer,
}

impl PreparedApiServer {
    pub fn coordinator(&self) -> &ShutdownCoordinator {
        &self.server.coordinator
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.server.state.subscribe()
    }

    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.server.http.local_addr()
    }

    pub fn rpc_addr(&self) -> Option<SocketAddr> {
        self.server.rpc.local_addr()
    }

    /// Bind both listeners, start the shutdown managers, then serve HTTP
    /// until the shutdown sequence closes it.
    ///
    /// Returns the aggregated cleanup result, or the fatal startup error.
    pub async fn run(self) -> Result<(), ServerError> {
        let server = &self.server;

        let started = server
            .http
            .bind()
            .and_then(|http| Ok((http, server.rpc.run()?)))
            .and_then(|addrs| server.coordinator.start().map(|_| addrs).map_err(ServerError::from));
        let (http_addr, rpc_addr) = match started {
            Ok(addrs) => addrs,
            Err(e) => {
                tracing::error!(error = %e, "Startup failed");
                server.coordinator.shutdown("startup").await;
                server.state.send_replace(ServerState::Stopped);
                return Err(e);
            }
        };

        server.state.send_replace(ServerState::Running);
        tracing::info!(http = %http_addr, rpc = %rpc_addr, "API server running");

        let served = server.http.serve().await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "HTTP server failed");
        }
        if !server.coordinator.is_shutting_down() {
            server.coordinator.shutdown("http-server").await;
        }

        let report = server.coordinator.wait().await;
        server.state.send_replace(ServerState::Stopped);
        tracing::info!(
            requested_by = %report.requested_by,
            callbacks = report.callbacks_run,
            failures = report.failures.len(),
            "API server stopped"
        );

        served?;
        report.to_result().map_err(ServerError::from)
    }
}
