//! Per-subsystem reconciliation pass

use crate::error::{ControlError, ControlResult};
use crate::gates::GateFailure;
use crate::graph::DependencyGraph;
use crate::installation::{load_installation, PlatformNetwork};
use crate::renderer::{RenderContext, Renderer};
use halyard_apply::{ApplyEngine, ApplyReport, Component, ErrorClass, PassContext, TeardownReport};
use halyard_status::{BackoffPolicy, ReconcileState, StatusManager, WaitReason};
use halyard_store::{Store, StoreExt};
use halyard_types::{Artifact, ConfigRecord, Provider, SubsystemId, SubsystemStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Settings shared by every controller
#[derive(Debug, Clone, Default)]
pub struct ControlSettings {
    /// Hosting platform, applied when the installation record names none
    pub provider: Provider,
    pub backoff: BackoffPolicy,
    /// Pod network discovered from the platform, merged into the installation
    pub platform_network: Option<PlatformNetwork>,
}

/// Result of one pass
#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub subsystem: SubsystemId,
    pub state: ReconcileState,
    /// Set when components were applied this pass
    pub applied: Option<ApplyReport>,
    /// Set when the subsystem was torn down this pass
    pub torn_down: Option<TeardownReport>,
}

impl PassOutcome {
    fn new(subsystem: SubsystemId) -> Self {
        Self {
            subsystem,
            state: ReconcileState::default(),
            applied: None,
            torn_down: None,
        }
    }

    /// Delay before the next pass; `None` waits for a trigger
    pub fn requeue_after(&self) -> Option<Duration> {
        self.state.backoff
    }
}

/// What the record should carry once the pass is over
enum Persist {
    /// The status manager's phase
    Phase,
    /// The empty no-error status
    Cleared,
}

/// Drives one subsystem: gates, upstream checks, render, apply, status.
///
/// A controller is owned by exactly one worker, so passes for the same
/// subsystem never overlap.
pub struct SubsystemController {
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn Store>,
    engine: ApplyEngine,
    graph: Arc<DependencyGraph>,
    settings: Arc<ControlSettings>,
    status: StatusManager,
}

impl SubsystemController {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        store: Arc<dyn Store>,
        graph: Arc<DependencyGraph>,
        settings: Arc<ControlSettings>,
    ) -> Self {
        let status = StatusManager::new(renderer.subsystem());
        Self {
            engine: ApplyEngine::new(Arc::clone(&store)),
            renderer,
            store,
            graph,
            settings,
            status,
        }
    }

    pub fn subsystem(&self) -> SubsystemId {
        self.renderer.subsystem()
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn state(&self) -> ReconcileState {
        self.status.state()
    }

    /// Run one pass to completion.
    ///
    /// Never fails: every error ends as a degraded status and the retry
    /// delay its class asks for.
    #[instrument(parent = ctx.span(), skip_all, fields(subsystem = %ctx.subsystem))]
    pub async fn reconcile(&mut self, ctx: &PassContext) -> PassOutcome {
        let mut outcome = PassOutcome::new(self.subsystem());

        let record = match self.store.get_record(self.subsystem()).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.status.on_record_not_found();
                outcome.state = self.status.state();
                return outcome;
            }
            Err(e) => {
                let kind = self.subsystem().record_kind();
                let requeue = self.fail(&ControlError::from(e), &format!("Error querying {}", kind));
                self.status.schedule(requeue);
                outcome.state = self.status.state();
                return outcome;
            }
        };
        self.status.restore(&record.status());

        let (requeue, persist) = self.run(ctx, &record, &mut outcome).await;
        self.status.schedule(requeue);

        if self.status.phase().is_found() {
            let desired = match persist {
                Persist::Phase => self.status.phase().to_status(record.version()),
                Persist::Cleared => Some(SubsystemStatus {
                    observed_version: record.version(),
                    ..Default::default()
                }),
            };
            if let Some(desired) = desired {
                if let Err(e) = self.write_status(&record, desired).await {
                    warn!(error = %e, "Failed to write status");
                    if requeue.is_none() {
                        self.status
                            .schedule(self.settings.backoff.for_class(ErrorClass::Transient));
                    }
                }
            }
        }

        outcome.state = self.status.state();
        debug!(
            phase = %outcome.state.phase,
            requeue = ?outcome.requeue_after(),
            elapsed_ms = ctx.elapsed().as_millis() as u64,
            "Pass finished"
        );
        outcome
    }

    async fn run(
        &mut self,
        ctx: &PassContext,
        record: &ConfigRecord,
        outcome: &mut PassOutcome,
    ) -> (Option<Duration>, Persist) {
        let backoff = self.settings.backoff;

        if record.is_deletion_requested() {
            return match self.remove(ctx, record, outcome).await {
                Ok(()) => {
                    self.status.on_record_not_found();
                    (None, Persist::Phase)
                }
                Err(e) => {
                    self.status.on_record_found();
                    (self.fail(&e, "Error removing subsystem"), Persist::Phase)
                }
            };
        }

        self.status.on_record_found();
        if let Err(e) = self.renderer.validate(record) {
            return (self.fail(&e, "Invalid configuration"), Persist::Phase);
        }

        if !record.is_enabled() {
            let identities = self.renderer.teardown_identities();
            return match self.engine.teardown(ctx, &identities).await {
                Ok(report) => {
                    outcome.torn_down = Some(report);
                    self.status.on_disabled();
                    (None, Persist::Cleared)
                }
                Err(e) => (
                    self.fail(&ControlError::from(e), "Error removing resources"),
                    Persist::Phase,
                ),
            };
        }

        for gate in self.renderer.preflight() {
            match gate.check(self.store.as_ref()).await {
                Ok(None) => {}
                Ok(Some(GateFailure { reason, detail, wait })) => {
                    debug!(gate = %gate, "Preflight gate closed");
                    self.status.set_degraded(reason, detail);
                    return (Some(backoff.for_wait(wait)), Persist::Phase);
                }
                Err(e) => {
                    return (self.fail(&e, &format!("Error checking {}", gate)), Persist::Phase)
                }
            }
        }

        let installation = match load_installation(
            self.store.as_ref(),
            self.settings.provider,
            self.settings.platform_network.as_ref(),
        )
        .await
        {
            Ok(Some(installation)) => installation,
            Ok(None) => {
                self.status.set_degraded("Installation not found", "");
                return (Some(backoff.for_wait(WaitReason::Upstream)), Persist::Phase);
            }
            Err(e) => return (self.fail(&e, "Error querying installation"), Persist::Phase),
        };
        let render_ctx = RenderContext {
            provider: installation.provider(),
            installation,
        };

        match self.check_upstreams().await {
            Ok(None) => {}
            Ok(Some((upstream, detail))) => {
                self.status
                    .set_degraded(format!("waiting on {}", upstream), detail);
                return (Some(backoff.for_wait(WaitReason::Upstream)), Persist::Phase);
            }
            Err(e) => return (self.fail(&e, "Error querying upstream"), Persist::Phase),
        }

        let components = match self.render(record, &render_ctx).await {
            Ok(components) => components,
            Err(e) => return (self.fail(&e, "Error rendering components"), Persist::Phase),
        };

        let owner = record.owner_reference();
        let batches: Vec<Vec<Artifact>> = components
            .iter()
            .map(|c| {
                c.objects()
                    .into_iter()
                    .map(|a| a.with_owner(owner.clone()))
                    .collect()
            })
            .collect();
        match self.engine.reconcile_all(ctx, batches).await {
            Ok(report) => outcome.applied = Some(report),
            Err(e) => {
                return (
                    self.fail(&ControlError::from(e), "Error creating / updating resource"),
                    Persist::Phase,
                )
            }
        }

        self.status.clear_degraded();
        self.status.mark_applied(components);
        if self.status.refresh() {
            (None, Persist::Phase)
        } else {
            (Some(backoff.for_wait(WaitReason::Availability)), Persist::Phase)
        }
    }

    /// Tear down then drop the record that asked to be deleted
    async fn remove(
        &self,
        ctx: &PassContext,
        record: &ConfigRecord,
        outcome: &mut PassOutcome,
    ) -> ControlResult<()> {
        let identities = self.renderer.teardown_identities();
        outcome.torn_down = Some(self.engine.teardown(ctx, &identities).await?);

        match self.store.delete(record.key()).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// First upstream that is not ready, with a detail for the user
    async fn check_upstreams(&self) -> ControlResult<Option<(SubsystemId, String)>> {
        for &upstream in self.graph.upstreams(self.subsystem()) {
            let detail = match self.store.get_record(upstream).await? {
                None => format!("{} not found", upstream.record_key()),
                Some(record) if record.is_deletion_requested() => {
                    format!("{} is being removed", upstream.record_key())
                }
                Some(record) if record.status().is_ready() => continue,
                Some(record) => {
                    let status = record.status();
                    match status.reason {
                        Some(reason) => format!("{} is {:?}: {}", upstream, status.state, reason),
                        None => format!("{} is not ready", upstream),
                    }
                }
            };
            return Ok(Some((upstream, detail)));
        }
        Ok(None)
    }

    async fn render(
        &self,
        record: &ConfigRecord,
        render_ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>> {
        let resolved = self
            .renderer
            .resolve(self.store.as_ref(), record, render_ctx)
            .await?;
        self.renderer.render(record, &resolved, render_ctx)
    }

    /// Degrade with the error's message and return its retry delay
    fn fail(&mut self, err: &ControlError, context: &str) -> Option<Duration> {
        let class = err.class();
        if class == ErrorClass::Fatal {
            error!(error = %err, "Unrecoverable error");
        }
        let (reason, detail) = err.degraded_message(context);
        self.status.set_degraded(reason, detail);
        self.settings.backoff.for_class(class)
    }

    /// Persist `desired` unless the record already carries the same condition
    async fn write_status(&self, record: &ConfigRecord, desired: SubsystemStatus) -> ControlResult<()> {
        let mut current = record.artifact().clone();
        for attempt in 0..2 {
            if ConfigRecord::new(current.clone()).status().same_condition(&desired) {
                return Ok(());
            }
            let expected = current.version;
            current.status = desired.to_value();
            match self.store.update(current, expected).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) if e.is_conflict() && attempt == 0 => {
                    match self.store.get(record.key()).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::Resolved;
    use crate::subsystems::LogStorageRenderer;
    use async_trait::async_trait;
    use halyard_apply::{StaticComponent, TriggerCause};
    use halyard_store::{InMemoryStore, StoreOp};
    use halyard_types::{ArtifactKey, Kind, StatusState};
    use serde_json::json;

    struct OneConfigMap;

    #[async_trait]
    impl Renderer for OneConfigMap {
        fn subsystem(&self) -> SubsystemId {
            SubsystemId::ClusterConnection
        }

        fn preflight(&self) -> &'static [crate::gates::Preflight] {
            &[]
        }

        async fn resolve(
            &self,
            _store: &dyn Store,
            _record: &ConfigRecord,
            _ctx: &RenderContext,
        ) -> ControlResult<Resolved> {
            Ok(Resolved::new())
        }

        fn render(
            &self,
            _record: &ConfigRecord,
            _resolved: &Resolved,
            _ctx: &RenderContext,
        ) -> ControlResult<Vec<Arc<dyn Component>>> {
            Ok(vec![Arc::new(StaticComponent::new(
                "one",
                vec![Artifact::namespaced(Kind::ConfigMap, "ns", "one", json!({"data": {}}))],
            ))])
        }

        fn teardown_identities(&self) -> Vec<ArtifactKey> {
            vec![ArtifactKey::namespaced(Kind::ConfigMap, "ns", "one")]
        }
    }

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store
            .seed(Artifact::new(crate::installation::installation_key(), json!({"spec": {}})))
            .await;
        store
            .seed(Artifact::new(SubsystemId::ClusterConnection.record_key(), json!({"spec": {}})))
            .await;
        store
    }

    fn controller(store: Arc<InMemoryStore>, renderer: Arc<dyn Renderer>) -> SubsystemController {
        SubsystemController::new(
            renderer,
            store,
            Arc::new(DependencyGraph::standard()),
            Arc::new(ControlSettings::default()),
        )
    }

    fn ctx(subsystem: SubsystemId) -> PassContext {
        PassContext::new(subsystem, TriggerCause::Manual)
    }

    #[tokio::test]
    async fn test_status_written_once_for_repeated_passes() {
        let store = seeded().await;
        let mut controller = controller(store.clone(), Arc::new(OneConfigMap));

        let first = controller.reconcile(&ctx(SubsystemId::ClusterConnection)).await;
        assert!(first.state.is_available());
        let record = store.peek(&SubsystemId::ClusterConnection.record_key()).await.unwrap();
        assert_eq!(ConfigRecord::new(record).status().state, StatusState::Ready);

        store.clear_calls();
        let second = controller.reconcile(&ctx(SubsystemId::ClusterConnection)).await;
        assert!(second.state.is_available());
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_status_write_retries_conflict() {
        let store = seeded().await;
        let key = SubsystemId::ClusterConnection.record_key();
        store.inject_conflicts(&key, 1);
        let mut controller = controller(store.clone(), Arc::new(OneConfigMap));

        controller.reconcile(&ctx(SubsystemId::ClusterConnection)).await;
        let record = ConfigRecord::new(store.peek(&key).await.unwrap());
        assert!(record.status().is_ready());
        assert_eq!(store.calls_of(StoreOp::Update), vec![key.clone(), key]);
    }

    #[tokio::test]
    async fn test_store_error_on_record_read_is_transient() {
        let store = seeded().await;
        store.inject_failure(
            StoreOp::Get,
            &SubsystemId::ClusterConnection.record_key(),
            halyard_store::Fault::Unavailable,
        );
        let mut controller = controller(store, Arc::new(OneConfigMap));

        let outcome = controller.reconcile(&ctx(SubsystemId::ClusterConnection)).await;
        assert!(outcome.state.phase.is_degraded());
        assert_eq!(outcome.requeue_after(), Some(BackoffPolicy::default().transient_wait));
    }

    #[tokio::test]
    async fn test_managed_cluster_log_storage_is_sticky() {
        let store = Arc::new(InMemoryStore::new());
        for key in [
            crate::gates::Preflight::ApiServer.watched_key(),
            crate::gates::Preflight::License.watched_key(),
        ] {
            store
                .seed(Artifact::new(key, json!({"spec": {}})).with_status(SubsystemStatus::ready(0).to_value()))
                .await;
        }
        store
            .seed(Artifact::new(
                crate::installation::installation_key(),
                json!({"spec": {"clusterManagementType": "Managed"}}),
            ))
            .await;
        store
            .seed(Artifact::new(SubsystemId::LogStorage.record_key(), json!({"spec": {}})))
            .await;

        let mut controller = controller(store, Arc::new(LogStorageRenderer));
        let outcome = controller.reconcile(&ctx(SubsystemId::LogStorage)).await;
        assert!(outcome.state.phase.is_degraded());
        assert_eq!(outcome.requeue_after(), None);
        assert!(outcome.applied.is_none());
    }
}
