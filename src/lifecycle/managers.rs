//! Shutdown managers: sources of a termination trigger.
//!
//! # Responsibilities
//! - Watch for a termination condition on a task of their own
//! - Fire the [`ShutdownTrigger`] handed to them by the coordinator
//! - Receive the final report once the callback chain has run
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Repeated SIGTERM/SIGINT after the first are ignored by the coordinator gate
//! - Process exit is left to `main`, which maps the report to an exit code

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::lifecycle::shutdown::{ShutdownError, ShutdownReport, ShutdownTrigger};

/// A source of a termination trigger.
#[async_trait]
pub trait ShutdownManager: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Begin watching. Implementations spawn their own task and call
    /// [`ShutdownTrigger::fire`] when their condition is met.
    fn start(&self, trigger: ShutdownTrigger) -> Result<(), ShutdownError>;

    /// Runs before the first callback when this manager won the trigger race.
    async fn shutdown_start(&self) -> Result<(), ShutdownError> {
        Ok(())
    }

    /// Runs after the last callback with the aggregated outcome.
    async fn shutdown_finish(&self, report: &ShutdownReport);
}

/// Fires on SIGINT or SIGTERM (Ctrl-C on non-unix platforms).
#[derive(Debug, Default)]
pub struct SignalManager;

impl SignalManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl ShutdownManager for SignalManager {
    fn name(&self) -> &str {
        "signal"
    }

    #[cfg(unix)]
    fn start(&self, trigger: ShutdownTrigger) -> Result<(), ShutdownError> {
        use tokio::signal::unix::{signal, SignalKind};

        let register = |kind: SignalKind| {
            signal(kind).map_err(|e| ShutdownError::ManagerStart {
                manager: self.name().to_string(),
                message: e.to_string(),
            })
        };
        let mut sigterm = register(SignalKind::terminate())?;
        let mut sigint = register(SignalKind::interrupt())?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("SIGTERM received, initiating graceful shutdown"),
                _ = sigint.recv() => tracing::info!("SIGINT received, initiating graceful shutdown"),
            }
            trigger.fire().await;
        });
        Ok(())
    }

    #[cfg(not(unix))]
    fn start(&self, trigger: ShutdownTrigger) -> Result<(), ShutdownError> {
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
            tracing::info!("Ctrl-C received, initiating graceful shutdown");
            trigger.fire().await;
        });
        Ok(())
    }

    async fn shutdown_finish(&self, report: &ShutdownReport) {
        tracing::info!(
            clean = report.is_clean(),
            callbacks = report.callbacks_run,
            "Signal-initiated shutdown finished"
        );
    }
}

/// Fires when [`trigger`](ManualManager::trigger) is called.
///
/// Lets embedding code, health checks and tests request shutdown.
pub struct ManualManager {
    name: String,
    trigger: Mutex<Option<ShutdownTrigger>>,
    finished: Mutex<Option<ShutdownReport>>,
}

impl ManualManager {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            trigger: Mutex::new(None),
            finished: Mutex::new(None),
        })
    }

    /// Request shutdown. Returns the report if this call ran the callback
    /// chain, `None` if the manager is not started or shutdown already began.
    pub async fn trigger(&self) -> Option<Arc<ShutdownReport>> {
        let trigger = self.trigger.lock().clone();
        match trigger {
            Some(trigger) => trigger.fire().await,
            None => {
                tracing::warn!(manager = %self.name, "Trigger ignored: manager not started");
                None
            }
        }
    }

    /// The report delivered to this manager, if it won the trigger race.
    pub fn finished_report(&self) -> Option<ShutdownReport> {
        self.finished.lock().clone()
    }
}

#[async_trait]
impl ShutdownManager for ManualManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self, trigger: ShutdownTrigger) -> Result<(), ShutdownError> {
        *self.trigger.lock() = Some(trigger);
        Ok(())
    }

    async fn shutdown_finish(&self, report: &ShutdownReport) {
        *self.finished.lock() = Some(report.clone());
    }
}
