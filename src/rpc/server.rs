//! RPC server lifecycle.
//!
//! `run` binds synchronously, so an occupied port is reported to the caller,
//! then spawns the serve loop and returns. `close` is a graceful stop: new
//! calls are refused and in-flight calls finish before the listener is
//! released. The wait is bounded by `rpc.drain_timeout_secs`; with no bound a
//! handler that never returns hangs shutdown.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Server, ServerTlsConfig};

use super::descriptor;
use super::proto::user_service_server::UserServiceServer;
use super::service::UserRpc;
use crate::config::RpcConfig;
use crate::error::{Protocol, ServerError};
use crate::net::{self, TlsError, TlsMaterial};
use crate::store::UserStore;

struct Running {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

pub struct RpcServer {
    config: RpcConfig,
    tls: Option<ServerTlsConfig>,
    store: Arc<dyn UserStore>,
    running: Mutex<Option<Running>>,
    local_addr: Mutex<Option<SocketAddr>>,
    closed: AtomicBool,
}

impl RpcServer {
    /// Create the server. Unreadable or invalid TLS material fails here.
    pub fn new(config: RpcConfig, store: Arc<dyn UserStore>) -> Result<Self, ServerError> {
        let tls = match &config.tls {
            Some(tls) => {
                let material = TlsMaterial::load(tls).map_err(|source| ServerError::Tls {
                    protocol: Protocol::Rpc,
                    source,
                })?;
                Some(ServerTlsConfig::new().identity(material.tonic_identity()))
            }
            None => None,
        };

        Ok(Self {
            config,
            tls,
            store,
            running: Mutex::new(None),
            local_addr: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Bind and spawn the serve loop. Returns the bound address.
    pub fn run(&self) -> Result<SocketAddr, ServerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ServerError::Closed(Protocol::Rpc));
        }
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServerError::AlreadyRunning(Protocol::Rpc));
        }

        let bind_err = |source| ServerError::Bind {
            protocol: Protocol::Rpc,
            address: self.config.bind_address.clone(),
            source,
        };
        let std_listener = net::bind(Protocol::Rpc, &self.config.bind_address)?;
        let addr = std_listener.local_addr().map_err(bind_err)?;
        let listener = tokio::net::TcpListener::from_std(std_listener).map_err(bind_err)?;

        let mut builder = Server::builder();
        if let Some(tls) = &self.tls {
            builder = builder.tls_config(tls.clone()).map_err(|e| ServerError::Tls {
                protocol: Protocol::Rpc,
                source: TlsError::Invalid(e.to_string()),
            })?;
        }

        let reflection = tonic_reflection::server::Builder::configure()
            .register_file_descriptor_set(descriptor::file_descriptor_set())
            .with_service_name(descriptor::SERVICE_NAME)
            .build_v1()
            .map_err(|e| ServerError::Reflection(e.to_string()))?;

        let service = UserServiceServer::new(UserRpc::new(self.store.clone()))
            .max_decoding_message_size(self.config.max_msg_size)
            .max_encoding_message_size(self.config.max_msg_size);

        let router = builder.add_service(service).add_service(reflection);
        let (stop, stop_rx) = oneshot::channel::<()>();
        let incoming = TcpListenerStream::new(listener);

        let task = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = stop_rx.await;
                })
                .await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "RPC server failed");
            }
            result
        });

        *running = Some(Running { stop, task });
        *self.local_addr.lock() = Some(addr);
        tracing::info!(address = %addr, tls = self.tls.is_some(), "RPC server started");
        Ok(addr)
    }

    /// Graceful stop. Idempotent and a no-op if the server never ran.
    pub async fn close(&self) -> Result<(), ServerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(Running { stop, mut task }) = self.running.lock().take() else {
            tracing::debug!("RPC server closed before running");
            return Ok(());
        };

        let _ = stop.send(());
        tracing::info!(drain_timeout_secs = ?self.config.drain_timeout_secs, "RPC server draining");

        let joined = match self.config.drain_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    task.abort();
                    tracing::warn!(secs, "RPC drain timed out, abandoning in-flight calls");
                    return Err(ServerError::DrainTimeout {
                        protocol: Protocol::Rpc,
                        secs,
                    });
                }
            },
            None => task.await,
        };

        match joined {
            Ok(result) => {
                tracing::info!(address = ?self.local_addr(), "RPC server stopped");
                result.map_err(ServerError::Rpc)
            }
            Err(e) => {
                tracing::error!(error = %e, "RPC serve task ended abnormally");
                Ok(())
            }
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}
