//! Dependency orchestrator
//!
//! Owns one controller per enabled subsystem and runs passes on trigger.
//! Upstream gating happens inside each pass against the upstream record's
//! persisted status, so controllers can also be split out and driven by
//! independent workers.

use crate::controller::{ControlSettings, PassOutcome, SubsystemController};
use crate::error::{ControlError, ControlResult};
use crate::graph::DependencyGraph;
use crate::renderer::Renderer;
use crate::routing::TriggerRouter;
use crate::subsystems::standard_renderers;
use halyard_apply::{PassContext, TriggerCause};
use halyard_status::ReconcileState;
use halyard_store::Store;
use halyard_types::SubsystemId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Orchestrator {
    controllers: BTreeMap<SubsystemId, SubsystemController>,
    graph: Arc<DependencyGraph>,
}

impl Orchestrator {
    /// Orchestrator for the four standard subsystems
    pub fn new(store: Arc<dyn Store>, settings: ControlSettings) -> Self {
        Self::with_renderers(store, settings, DependencyGraph::standard(), standard_renderers())
    }

    pub fn with_renderers(
        store: Arc<dyn Store>,
        settings: ControlSettings,
        graph: DependencyGraph,
        renderers: Vec<Arc<dyn Renderer>>,
    ) -> Self {
        let graph = Arc::new(graph);
        let settings = Arc::new(settings);
        let controllers = renderers
            .into_iter()
            .map(|renderer| {
                let controller = SubsystemController::new(
                    renderer,
                    Arc::clone(&store),
                    Arc::clone(&graph),
                    Arc::clone(&settings),
                );
                (controller.subsystem(), controller)
            })
            .collect();
        Self { controllers, graph }
    }

    /// Keep only the listed subsystems.
    ///
    /// A kept subsystem whose upstream is dropped can never pass its
    /// upstream check; that is logged, not rejected.
    pub fn retain(&mut self, enabled: &[SubsystemId]) {
        self.controllers.retain(|id, _| enabled.contains(id));
        for id in self.controllers.keys() {
            for upstream in self.graph.upstreams(*id) {
                if !self.controllers.contains_key(upstream) {
                    warn!(subsystem = %id, upstream = %upstream, "Upstream subsystem is not enabled");
                }
            }
        }
    }

    pub fn enabled(&self) -> Vec<SubsystemId> {
        self.controllers.keys().copied().collect()
    }

    pub fn graph(&self) -> &Arc<DependencyGraph> {
        &self.graph
    }

    pub fn state(&self, subsystem: SubsystemId) -> Option<ReconcileState> {
        self.controllers.get(&subsystem).map(SubsystemController::state)
    }

    /// Run one pass for `subsystem`; the outcome carries the scheduled retry
    pub async fn on_trigger(
        &mut self,
        subsystem: SubsystemId,
        cause: TriggerCause,
    ) -> ControlResult<PassOutcome> {
        let controller = self
            .controllers
            .get_mut(&subsystem)
            .ok_or(ControlError::NotEnabled(subsystem))?;
        let ctx = PassContext::new(subsystem, cause);
        Ok(controller.reconcile(&ctx).await)
    }

    /// One pass per enabled subsystem in dependency order
    pub async fn reconcile_all(&mut self, cause: TriggerCause) -> Vec<PassOutcome> {
        let order: Vec<SubsystemId> = self
            .graph
            .order()
            .iter()
            .copied()
            .filter(|id| self.controllers.contains_key(id))
            .collect();

        let mut outcomes = Vec::with_capacity(order.len());
        for id in order {
            if let Ok(outcome) = self.on_trigger(id, cause.clone()).await {
                outcomes.push(outcome);
            }
        }
        let available = outcomes.iter().filter(|o| o.state.is_available()).count();
        info!(passes = outcomes.len(), available, cause = %cause, "Reconciled all subsystems");
        outcomes
    }

    /// Routes for the enabled subsystems' watched keys
    pub fn router(&self) -> TriggerRouter {
        TriggerRouter::for_renderers(
            self.controllers.values().map(|c| c.renderer().as_ref()),
            &self.graph,
        )
    }

    /// Hand each controller to its own worker
    pub fn into_controllers(self) -> Vec<SubsystemController> {
        self.controllers.into_values().collect()
    }
}
