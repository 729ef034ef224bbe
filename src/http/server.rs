//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Hold the Axum router the composite installs routes into
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Bind the listener, optionally with TLS
//! - Serve until closed, then drain in-flight requests within a bound
//!
//! # Design Decisions
//! - `run` blocks the caller until the listener stops
//! - `close` is idempotent and never blocks past the drain bound
//! - Closing a server that never ran only releases a bound listener

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use parking_lot::Mutex;
use tokio::sync::watch;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::HttpConfig;
use crate::error::{Protocol, ServerError};
use crate::net::{self, TlsMaterial};

/// Where the listener is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Bound,
    Serving,
    Stopped,
}

/// HTTP protocol server.
pub struct HttpServer {
    config: HttpConfig,
    tls: Option<RustlsConfig>,
    routes: Mutex<Router>,
    listener: Mutex<Option<std::net::TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    handle: Handle,
    closed: AtomicBool,
    state: watch::Sender<ListenerState>,
}

impl HttpServer {
    /// Create a server, loading TLS material up front so bad certificates
    /// fail construction rather than the first handshake.
    pub async fn new(config: HttpConfig) -> Result<Self, ServerError> {
        let tls_err = |source| ServerError::Tls {
            protocol: Protocol::Http,
            source,
        };
        let tls = match &config.tls {
            Some(tls) => {
                let material = TlsMaterial::load(tls).map_err(tls_err)?;
                Some(material.rustls_config().await.map_err(tls_err)?)
            }
            None => None,
        };

        Ok(Self {
            config,
            tls,
            routes: Mutex::new(Router::new()),
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            handle: Handle::new(),
            closed: AtomicBool::new(false),
            state: watch::channel(ListenerState::Idle).0,
        })
    }

    /// Merge `routes` into the served router. Only effective before `serve`.
    pub fn install_routes(&self, routes: Router) {
        let mut guard = self.routes.lock();
        let current = std::mem::take(&mut *guard);
        *guard = current.merge(routes);
    }

    /// Bind the listener without serving. Reports an occupied port or a bad
    /// address synchronously.
    pub fn bind(&self) -> Result<SocketAddr, ServerError> {
        if *self.state.borrow() != ListenerState::Idle {
            return Err(ServerError::AlreadyRunning(Protocol::Http));
        }
        let listener = net::bind(Protocol::Http, &self.config.bind_address)?;
        let addr = listener.local_addr().map_err(|source| ServerError::Bind {
            protocol: Protocol::Http,
            address: self.config.bind_address.clone(),
            source,
        })?;

        *self.listener.lock() = Some(listener);
        *self.local_addr.lock() = Some(addr);
        self.state.send_replace(ListenerState::Bound);
        Ok(addr)
    }

    /// Bind if needed, then serve until closed.
    pub async fn run(&self) -> Result<(), ServerError> {
        if *self.state.borrow() == ListenerState::Idle {
            self.bind()?;
        }
        self.serve().await
    }

    /// Serve on the bound listener. Returns once the listener has stopped.
    pub async fn serve(&self) -> Result<(), ServerError> {
        let Some(listener) = self.listener.lock().take() else {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            return Err(ServerError::AlreadyRunning(Protocol::Http));
        };

        let app = self.build_app();
        let addr = self.local_addr();
        self.state.send_replace(ListenerState::Serving);
        tracing::info!(address = ?addr, tls = self.tls.is_some(), "HTTP server starting");

        let result = match &self.tls {
            Some(tls) => {
                axum_server::from_tcp_rustls(listener, tls.clone())
                    .handle(self.handle.clone())
                    .serve(app.into_make_service())
                    .await
            }
            None => {
                axum_server::from_tcp(listener)
                    .handle(self.handle.clone())
                    .serve(app.into_make_service())
                    .await
            }
        };

        self.state.send_replace(ListenerState::Stopped);
        tracing::info!("HTTP server stopped");
        result.map_err(ServerError::Http)
    }

    /// Stop accepting, drain in-flight requests for up to
    /// `drain_timeout_secs`, then force-close what remains.
    pub async fn close(&self) -> Result<(), ServerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let state = *self.state.borrow();
        match state {
            ListenerState::Idle | ListenerState::Bound | ListenerState::Stopped => {
                drop(self.listener.lock().take());
                self.handle.shutdown();
                self.state.send_replace(ListenerState::Stopped);
                tracing::debug!(?state, "HTTP server closed before serving");
                Ok(())
            }
            ListenerState::Serving => {
                let drain = Duration::from_secs(self.config.drain_timeout_secs);
                tracing::info!(drain = ?drain, "HTTP server draining");
                self.handle.graceful_shutdown(Some(drain));

                let mut rx = self.state.subscribe();
                let deadline = drain.saturating_add(Duration::from_secs(1));
                let stopped = tokio::time::timeout(
                    deadline,
                    rx.wait_for(|s| *s == ListenerState::Stopped),
                )
                .await
                .is_ok();
                if stopped {
                    Ok(())
                } else {
                    Err(ServerError::DrainTimeout {
                        protocol: Protocol::Http,
                        secs: self.config.drain_timeout_secs,
                    })
                }
            }
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn state(&self) -> ListenerState {
        *self.state.borrow()
    }

    /// Build the router with all middleware layers.
    #[allow(deprecated)]
    fn build_app(&self) -> Router {
        let routes = std::mem::take(&mut *self.routes.lock());
        routes
            .layer(RequestBodyLimitLayer::new(self.config.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}
