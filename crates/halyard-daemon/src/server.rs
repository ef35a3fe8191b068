//! Daemon setup and lifecycle management

use crate::config::DaemonConfig;
use crate::error::DaemonResult;
use crate::seed::seed_from_file;
use crate::triggers::route_events;
use crate::worker::{Worker, WorkerHandle};
use halyard_control::{Orchestrator, SubsystemController};
use halyard_store::{InMemoryStore, Store};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// Halyard daemon
pub struct Daemon {
    config: DaemonConfig,
    store: Arc<InMemoryStore>,
}

impl Daemon {
    /// Create the daemon and seed its store if configured
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store = Arc::new(InMemoryStore::new());
        if let Some(path) = &config.store.seed_path {
            seed_from_file(&store, path).await?;
        }
        Ok(Self { config, store })
    }

    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> DaemonResult<Vec<SubsystemController>> {
        self.run_until(shutdown_signal()).await
    }

    /// Run one worker per enabled subsystem until `signal` resolves.
    ///
    /// Returns the controllers so their final state can be inspected.
    pub async fn run_until<F>(self, signal: F) -> DaemonResult<Vec<SubsystemController>>
    where
        F: Future<Output = ()>,
    {
        let store: Arc<dyn Store> = self.store.clone();
        let mut orchestrator = Orchestrator::new(store, self.config.control_settings());
        orchestrator.retain(&self.config.controllers.enabled);

        let router = orchestrator.router();
        let events = self.store.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut handles = HashMap::new();
        let mut workers = Vec::new();
        for controller in orchestrator.into_controllers() {
            let handle = Arc::new(WorkerHandle::new());
            handles.insert(controller.subsystem(), Arc::clone(&handle));
            let worker = Worker::new(
                controller,
                handle,
                self.config.controllers.resync_interval(),
                shutdown_rx.clone(),
            );
            workers.push(tokio::spawn(worker.run()));
        }
        info!(
            workers = workers.len(),
            provider = %self.config.provider,
            "Halyard daemon started"
        );

        let router_task = tokio::spawn(route_events(events, router, handles, shutdown_rx));

        signal.await;
        info!("Halyard daemon shutting down");
        let _ = shutdown_tx.send(true);

        let mut controllers = Vec::with_capacity(workers.len());
        for worker in workers {
            match worker.await {
                Ok(controller) => controllers.push(controller),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }
        if let Err(e) = router_task.await {
            error!(error = %e, "Event router task failed");
        }
        Ok(controllers)
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
