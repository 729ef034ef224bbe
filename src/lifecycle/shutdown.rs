//! Shutdown coordination for the API server.
//!
//! A [`ShutdownCoordinator`] owns a set of [`ShutdownManager`]s (sources of a
//! termination trigger) and an ordered list of cleanup callbacks. The first
//! manager to fire runs the callback chain; every later trigger is a no-op.
//!
//! ```text
//! manager A fires ─┐
//! manager B fires ─┼─▶ gate (first wins) ─▶ shutdown_start ─▶ cb[0] ─▶ cb[1] ─▶ … ─▶ shutdown_finish(report)
//! manager C fires ─┘         │
//!                           └─▶ later triggers return immediately
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::lifecycle::managers::ShutdownManager;

/// Error produced by a cleanup callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

type CallbackAction = Box<dyn FnOnce(String) -> BoxFuture<'static, Result<(), CallbackError>> + Send>;

/// Errors from the coordinator itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ShutdownError {
    /// `start` was already called; managers can no longer be registered.
    #[error("shutdown coordinator already started")]
    AlreadyStarted,
    /// The callback chain is running or has run.
    #[error("shutdown already in progress")]
    ShuttingDown,
    /// A manager could not begin watching for its trigger.
    #[error("shutdown manager '{manager}' failed to start: {message}")]
    ManagerStart { manager: String, message: String },
    /// One or more cleanup callbacks failed. The others still ran.
    #[error("{} shutdown callback(s) failed: {}", .0.len(), describe(.0))]
    Callbacks(Vec<CallbackFailure>),
}

fn describe(failures: &[CallbackFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A callback that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("#{order} '{name}': {message}")]
pub struct CallbackFailure {
    /// Registration order of the callback.
    pub order: usize,
    pub name: String,
    pub message: String,
}

/// Outcome of one run of the callback chain.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Name of the manager (or caller) that initiated shutdown.
    pub requested_by: String,
    /// Number of callbacks that ran.
    pub callbacks_run: usize,
    pub failures: Vec<CallbackFailure>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Aggregated result: `Ok` when every callback succeeded.
    pub fn to_result(&self) -> Result<(), ShutdownError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError::Callbacks(self.failures.clone()))
        }
    }
}

struct ShutdownCallback {
    name: String,
    action: CallbackAction,
}

struct Inner {
    managers: Mutex<Vec<Arc<dyn ShutdownManager>>>,
    callbacks: Mutex<Vec<ShutdownCallback>>,
    started: AtomicBool,
    shutting_down: AtomicBool,
    report_tx: watch::Sender<Option<Arc<ShutdownReport>>>,
}

/// Coordinator for graceful shutdown.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (report_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                managers: Mutex::new(Vec::new()),
                callbacks: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                report_tx,
            }),
        }
    }

    /// Register a manager. Fails once [`start`](Self::start) has been called.
    pub fn add_shutdown_manager(&self, manager: Arc<dyn ShutdownManager>) -> Result<(), ShutdownError> {
        let mut managers = self.inner.managers.lock();
        if self.inner.started.load(Ordering::SeqCst) {
            return Err(ShutdownError::AlreadyStarted);
        }
        tracing::debug!(manager = manager.name(), "Shutdown manager registered");
        managers.push(manager);
        Ok(())
    }

    /// Append a cleanup callback. Callbacks run in registration order and
    /// receive the name of the manager that requested shutdown.
    pub fn add_shutdown_callback<F, Fut, E>(&self, name: impl Into<String>, callback: F) -> Result<(), ShutdownError>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<CallbackError>,
    {
        let mut callbacks = self.inner.callbacks.lock();
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(ShutdownError::ShuttingDown);
        }
        callbacks.push(ShutdownCallback {
            name: name.into(),
            action: Box::new(move |requested_by| {
                callback(requested_by).map(|r| r.map_err(Into::into)).boxed()
            }),
        });
        Ok(())
    }

    /// Start every registered manager's trigger watch.
    ///
    /// A second call returns [`ShutdownError::AlreadyStarted`].
    pub fn start(&self) -> Result<(), ShutdownError> {
        let managers = {
            let managers = self.inner.managers.lock();
            if self.inner.started.swap(true, Ordering::SeqCst) {
                return Err(ShutdownError::AlreadyStarted);
            }
            managers.clone()
        };

        for manager in managers {
            let trigger = ShutdownTrigger {
                coordinator: self.clone(),
                manager: Arc::clone(&manager),
            };
            manager.start(trigger)?;
            tracing::info!(manager = manager.name(), "Shutdown manager started");
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Run the shutdown sequence without a manager, e.g. after a listener
    /// failed on its own. Returns `None` if shutdown had already begun.
    pub async fn shutdown(&self, requested_by: &str) -> Option<Arc<ShutdownReport>> {
        self.initiate(requested_by, None).await
    }

    /// Wait until the callback chain has completed and return its report.
    pub async fn wait(&self) -> Arc<ShutdownReport> {
        let mut rx = self.inner.report_tx.subscribe();
        loop {
            if let Some(report) = rx.borrow_and_update().as_ref() {
                return Arc::clone(report);
            }
            // The sender lives in `self`, so this only returns after a send.
            let _ = rx.changed().await;
        }
    }

    /// The completed report, if shutdown has finished.
    pub fn report(&self) -> Option<Arc<ShutdownReport>> {
        self.inner.report_tx.borrow().clone()
    }

    async fn initiate(
        &self,
        requested_by: &str,
        manager: Option<&Arc<dyn ShutdownManager>>,
    ) -> Option<Arc<ShutdownReport>> {
        // Only the first trigger passes this gate.
        let callbacks = {
            let mut callbacks = self.inner.callbacks.lock();
            if self
                .inner
                .shutting_down
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                tracing::debug!(requested_by, "Shutdown already in progress, ignoring trigger");
                return None;
            }
            std::mem::take(&mut *callbacks)
        };

        tracing::info!(requested_by, callbacks = callbacks.len(), "Shutdown initiated");

        let mut failures = Vec::new();
        if let Some(manager) = manager {
            if let Err(e) = manager.shutdown_start().await {
                tracing::warn!(manager = manager.name(), error = %e, "Shutdown manager start hook failed");
            }
        }

        let callbacks_run = callbacks.len();
        for (order, callback) in callbacks.into_iter().enumerate() {
            let ShutdownCallback { name, action } = callback;
            match run_isolated(action, requested_by.to_string()).await {
                Ok(()) => {
                    tracing::info!(callback = %name, order, "Shutdown callback completed");
                    crate::observability::metrics::record_shutdown_callback(true);
                }
                Err(message) => {
                    tracing::error!(callback = %name, order, error = %message, "Shutdown callback failed");
                    crate::observability::metrics::record_shutdown_callback(false);
                    failures.push(CallbackFailure { order, name, message });
                }
            }
        }

        let report = Arc::new(ShutdownReport {
            requested_by: requested_by.to_string(),
            callbacks_run,
            failures,
        });

        if let Some(manager) = manager {
            manager.shutdown_finish(&report).await;
        }

        if report.is_clean() {
            tracing::info!(requested_by, "Shutdown complete");
        } else {
            tracing::warn!(requested_by, failed = report.failures.len(), "Shutdown complete with errors");
        }

        self.inner.report_tx.send_replace(Some(Arc::clone(&report)));
        Some(report)
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one callback, converting both errors and panics into a message.
async fn run_isolated(action: CallbackAction, requested_by: String) -> Result<(), String> {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| action(requested_by))) {
        Ok(future) => future,
        Err(panic) => return Err(panic_message(panic.as_ref())),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Handed to each manager on start; firing it requests shutdown.
#[derive(Clone)]
pub struct ShutdownTrigger {
    coordinator: ShutdownCoordinator,
    manager: Arc<dyn ShutdownManager>,
}

impl ShutdownTrigger {
    /// Request shutdown on behalf of the owning manager.
    ///
    /// The first caller across all managers runs the callback chain and gets
    /// the report; everyone else returns `None` immediately.
    pub async fn fire(&self) -> Option<Arc<ShutdownReport>> {
        self.coordinator
            .initiate(self.manager.name(), Some(&self.manager))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::managers::ManualManager;

    fn recorder() -> Arc<Mutex<Vec<usize>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn add_recording(coordinator: &ShutdownCoordinator, log: &Arc<Mutex<Vec<usize>>>, index: usize) {
        let log = Arc::clone(log);
        coordinator
            .add_shutdown_callback(format!("cb-{index}"), move |_| async move {
                log.lock().push(index);
                Ok::<_, CallbackError>(())
            })
            .unwrap();
    }

    #[tokio::test]
    async fn callbacks_run_in_registration_order() {
        let coordinator = ShutdownCoordinator::new();
        let log = recorder();
        for i in 0..5 {
            add_recording(&coordinator, &log, i);
        }

        let report = coordinator.shutdown("test").await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.callbacks_run, 5);
        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn second_trigger_is_noop() {
        let coordinator = ShutdownCoordinator::new();
        let log = recorder();
        add_recording(&coordinator, &log, 0);

        assert!(coordinator.shutdown("first").await.is_some());
        assert!(coordinator.shutdown("second").await.is_none());
        assert_eq!(*log.lock(), vec![0]);
        assert_eq!(coordinator.report().unwrap().requested_by, "first");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_managers_run_chain_once() {
        for managers in 1..=8 {
            let coordinator = ShutdownCoordinator::new();
            let log = recorder();
            for i in 0..4 {
                add_recording(&coordinator, &log, i);
            }

            let handles: Vec<_> = (0..managers)
                .map(|i| {
                    let manager = ManualManager::new(format!("manual-{i}"));
                    coordinator.add_shutdown_manager(manager.clone()).unwrap();
                    manager
                })
                .collect();
            coordinator.start().unwrap();

            let fired: Vec<_> = handles
                .iter()
                .map(|m| {
                    let m = Arc::clone(m);
                    tokio::spawn(async move { m.trigger().await })
                })
                .collect();
            for task in fired {
                task.await.unwrap();
            }

            let report = coordinator.wait().await;
            assert!(report.is_clean());
            assert_eq!(*log.lock(), vec![0, 1, 2, 3], "with {managers} managers");
        }
    }

    #[tokio::test]
    async fn failing_callback_does_not_stop_chain() {
        let coordinator = ShutdownCoordinator::new();
        let log = recorder();
        coordinator
            .add_shutdown_callback("store-close", |_| async {
                Err::<(), _>(CallbackError::from("store already gone"))
            })
            .unwrap();
        add_recording(&coordinator, &log, 1);
        add_recording(&coordinator, &log, 2);

        let report = coordinator.shutdown("test").await.unwrap();
        assert_eq!(*log.lock(), vec![1, 2]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].order, 0);
        assert_eq!(report.failures[0].name, "store-close");
        assert!(matches!(report.to_result(), Err(ShutdownError::Callbacks(_))));
    }

    #[tokio::test]
    async fn panicking_callback_is_isolated() {
        let coordinator = ShutdownCoordinator::new();
        let log = recorder();
        coordinator
            .add_shutdown_callback("panics", |_| async {
                if true {
                    panic!("boom");
                }
                Ok::<_, CallbackError>(())
            })
            .unwrap();
        add_recording(&coordinator, &log, 1);

        let report = coordinator.shutdown("test").await.unwrap();
        assert_eq!(*log.lock(), vec![1]);
        assert_eq!(report.failures[0].message, "panicked: boom");
    }

    #[tokio::test]
    async fn registration_rules() {
        let coordinator = ShutdownCoordinator::new();
        coordinator
            .add_shutdown_manager(ManualManager::new("a"))
            .unwrap();
        coordinator.start().unwrap();

        assert!(matches!(coordinator.start(), Err(ShutdownError::AlreadyStarted)));
        assert!(matches!(
            coordinator.add_shutdown_manager(ManualManager::new("b")),
            Err(ShutdownError::AlreadyStarted)
        ));

        coordinator.shutdown("test").await;
        let late = coordinator.add_shutdown_callback("late", |_| async { Ok::<_, CallbackError>(()) });
        assert!(matches!(late, Err(ShutdownError::ShuttingDown)));
    }

    #[tokio::test]
    async fn callbacks_receive_requesting_manager() {
        let coordinator = ShutdownCoordinator::new();
        let seen = Arc::new(Mutex::new(String::new()));
        let seen_cb = Arc::clone(&seen);
        coordinator
            .add_shutdown_callback("record", move |by| async move {
                *seen_cb.lock() = by;
                Ok::<_, CallbackError>(())
            })
            .unwrap();
        let manager = ManualManager::new("health-check");
        coordinator.add_shutdown_manager(manager.clone()).unwrap();
        coordinator.start().unwrap();

        manager.trigger().await;
        coordinator.wait().await;
        assert_eq!(*seen.lock(), "health-check");
        assert_eq!(manager.finished_report().unwrap().requested_by, "health-check");
    }
}
