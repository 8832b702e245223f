//! Tokio host for registered workflows
//!
//! Write notifications arrive over a bounded channel and are dispatched onto
//! the blocking pool, at most `max_concurrent` at a time. Each workflow's two
//! sweeps run on its own schedule. Shutdown stops intake, drains queued and
//! in-flight work, then returns.

use crate::registry::{ProcessorRegistry, ShardWorkflow};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::{DocPath, Result, RuntimeConfig, StrataError};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinSet;

#[derive(Debug, Default)]
struct Counters {
    notifications: AtomicU64,
    failures: AtomicU64,
    sweeps: AtomicU64,
}

/// Totals over a runtime's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub notifications: u64,
    pub failures: u64,
    pub sweeps: u64,
}

/// Cloneable handle for feeding and stopping a running [`EngineRuntime`]
#[derive(Clone)]
pub struct RuntimeHandle {
    sender: mpsc::Sender<DocPath>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl RuntimeHandle {
    /// Queue a write notification, waiting for channel capacity.
    pub async fn notify(&self, path: DocPath) -> Result<()> {
        self.sender
            .send(path)
            .await
            .map_err(|_| StrataError::Unavailable("runtime is not accepting notifications".into()))
    }

    /// Queue a write notification without waiting.
    pub fn try_notify(&self, path: DocPath) -> Result<()> {
        self.sender.try_send(path).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                StrataError::Unavailable("notification channel is full".into())
            }
            mpsc::error::TrySendError::Closed(_) => {
                StrataError::Unavailable("runtime is not accepting notifications".into())
            }
        })
    }

    /// Signal graceful shutdown
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

pub struct EngineRuntime {
    registry: Arc<ProcessorRegistry>,
    config: RuntimeConfig,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    sender: mpsc::Sender<DocPath>,
    receiver: mpsc::Receiver<DocPath>,
    counters: Arc<Counters>,
}

impl EngineRuntime {
    pub fn new(registry: Arc<ProcessorRegistry>, config: RuntimeConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.channel_capacity.max(1));
        Self {
            registry,
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
            sender,
            receiver,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            sender: self.sender.clone(),
            shutdown: self.shutdown.clone(),
            shutdown_notify: self.shutdown_notify.clone(),
        }
    }

    /// Run until shutdown is signalled or every handle is dropped.
    pub async fn run(self) -> Result<RuntimeStats> {
        let EngineRuntime {
            registry,
            config,
            shutdown,
            shutdown_notify,
            sender,
            mut receiver,
            counters,
        } = self;
        // Only handles keep the channel open from here on.
        drop(sender);

        tracing::info!(
            processors = registry.len(),
            max_concurrent = config.max_concurrent,
            "Engine runtime starting"
        );

        let mut sweepers = JoinSet::new();
        for workflow in registry.iter() {
            sweepers.spawn(sweep_loop(
                workflow.clone(),
                shutdown.clone(),
                shutdown_notify.clone(),
                counters.clone(),
            ));
        }

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            let notified = shutdown_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                received = receiver.recv() => match received {
                    Some(path) => {
                        dispatch(&registry, &semaphore, &counters, &mut in_flight, path).await?;
                    }
                    None => break,
                },
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Notification task panicked");
                    }
                }
                _ = &mut notified => break,
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Engine runtime draining");
        shutdown.store(true, Ordering::SeqCst);
        shutdown_notify.notify_waiters();

        receiver.close();
        while let Some(path) = receiver.recv().await {
            dispatch(&registry, &semaphore, &counters, &mut in_flight, path).await?;
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Notification task panicked");
            }
        }
        while let Some(joined) = sweepers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Sweep loop panicked");
            }
        }

        let stats = RuntimeStats {
            notifications: counters.notifications.load(Ordering::SeqCst),
            failures: counters.failures.load(Ordering::SeqCst),
            sweeps: counters.sweeps.load(Ordering::SeqCst),
        };
        tracing::info!(?stats, "Engine runtime stopped");
        Ok(stats)
    }
}

async fn dispatch(
    registry: &Arc<ProcessorRegistry>,
    semaphore: &Arc<Semaphore>,
    counters: &Arc<Counters>,
    in_flight: &mut JoinSet<()>,
    path: DocPath,
) -> Result<()> {
    let permit = semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|e| StrataError::Unavailable(e.to_string()))?;
    counters.notifications.fetch_add(1, Ordering::SeqCst);

    let registry = registry.clone();
    let counters = counters.clone();
    in_flight.spawn_blocking(move || {
        let _permit = permit;
        for (processor, outcome) in registry.notify(&path) {
            if let Err(e) = outcome {
                counters.failures.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(processor = %processor, event = %path, error = %e, "Notification failed");
            }
        }
    });
    Ok(())
}

async fn sweep_loop(
    workflow: Arc<dyn ShardWorkflow>,
    shutdown: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
    counters: Arc<Counters>,
) {
    loop {
        let next = match workflow.sweep_config().schedule.next_run_time(Utc::now()) {
            Ok(Some(next)) => next,
            Ok(None) => {
                tracing::warn!(processor = workflow.id(), "Sweep schedule has no further runs");
                return;
            }
            Err(e) => {
                tracing::error!(processor = workflow.id(), error = %e, "Invalid sweep schedule");
                return;
            }
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        let notified = shutdown_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = &mut notified => return,
        }

        let sweeping = workflow.clone();
        let result = tokio::task::spawn_blocking(move || {
            (sweeping.sweep_stale_events(), sweeping.sweep_stale_triggers())
        })
        .await;
        counters.sweeps.fetch_add(1, Ordering::SeqCst);

        match result {
            Ok((events, triggers)) => {
                for outcome in [events, triggers] {
                    if let Err(e) = outcome {
                        counters.failures.fetch_add(1, Ordering::SeqCst);
                        tracing::error!(processor = workflow.id(), error = %e, "Sweep failed");
                    }
                }
            }
            Err(e) => tracing::error!(processor = workflow.id(), error = %e, "Sweep task panicked"),
        }
    }
}
