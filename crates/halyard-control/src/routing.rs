//! Routing store changes to the subsystems that watch them

use crate::gates::Preflight;
use crate::graph::DependencyGraph;
use crate::renderer::Renderer;
use halyard_apply::TriggerCause;
use halyard_store::StoreEvent;
use halyard_types::{ArtifactKey, SubsystemId};
use std::collections::{BTreeSet, HashMap};

/// Maps watched keys to the subsystems a change should trigger
#[derive(Debug, Clone, Default)]
pub struct TriggerRouter {
    watchers: HashMap<ArtifactKey, BTreeSet<SubsystemId>>,
}

impl TriggerRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build routes for a set of renderers.
    ///
    /// Each subsystem watches its own record, its declared inputs, the
    /// records behind its preflight gates and the records of its upstreams.
    pub fn for_renderers<'a, I>(renderers: I, graph: &DependencyGraph) -> Self
    where
        I: IntoIterator<Item = &'a dyn Renderer>,
    {
        let mut router = Self::new();
        for renderer in renderers {
            let id = renderer.subsystem();
            router.watch(id.record_key(), id);
            for key in renderer.watches() {
                router.watch(key, id);
            }
            for gate in renderer.preflight() {
                router.watch(gate.watched_key(), id);
            }
            for upstream in graph.upstreams(id) {
                router.watch(upstream.record_key(), id);
            }
        }
        router
    }

    pub fn watch(&mut self, key: ArtifactKey, subsystem: SubsystemId) {
        self.watchers.entry(key).or_default().insert(subsystem);
    }

    /// Subsystems to trigger for a change, each with its cause
    pub fn route(&self, event: &StoreEvent) -> Vec<(SubsystemId, TriggerCause)> {
        let Some(watchers) = self.watchers.get(&event.key) else {
            return Vec::new();
        };
        watchers
            .iter()
            .map(|&id| {
                let cause = if id.record_key() == event.key {
                    TriggerCause::RecordChanged
                } else {
                    TriggerCause::DependencyChanged(event.key.clone())
                };
                (id, cause)
            })
            .collect()
    }

    pub fn is_watched(&self, key: &ArtifactKey) -> bool {
        self.watchers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::{cluster_config_key, standard_renderers};
    use halyard_store::ChangeKind;
    use std::sync::Arc;

    fn router() -> TriggerRouter {
        let renderers = standard_renderers();
        TriggerRouter::for_renderers(renderers.iter().map(Arc::as_ref), &DependencyGraph::standard())
    }

    fn event(key: ArtifactKey) -> StoreEvent {
        StoreEvent {
            key,
            change: ChangeKind::Updated,
        }
    }

    #[test]
    fn test_own_record_is_record_changed() {
        let routes = router().route(&event(SubsystemId::Manager.record_key()));
        assert_eq!(routes, vec![(SubsystemId::Manager, TriggerCause::RecordChanged)]);
    }

    #[test]
    fn test_upstream_record_triggers_downstreams() {
        let key = SubsystemId::LogStorage.record_key();
        let routes = router().route(&event(key.clone()));
        assert_eq!(
            routes,
            vec![
                (SubsystemId::LogStorage, TriggerCause::RecordChanged),
                (SubsystemId::LogCollector, TriggerCause::DependencyChanged(key.clone())),
                (SubsystemId::Manager, TriggerCause::DependencyChanged(key)),
            ]
        );
    }

    #[test]
    fn test_shared_input_and_gates() {
        let router = router();
        let targets: Vec<SubsystemId> = router
            .route(&event(cluster_config_key()))
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(targets, vec![SubsystemId::LogCollector, SubsystemId::Manager]);

        let license = router.route(&event(Preflight::License.watched_key()));
        assert_eq!(license.len(), 3);
        assert!(license.iter().all(|(id, _)| *id != SubsystemId::ClusterConnection));

        for gate in Preflight::ALL {
            assert!(router.is_watched(&gate.watched_key()));
        }
    }

    #[test]
    fn test_unwatched_key_routes_nowhere() {
        let key = ArtifactKey::cluster(halyard_types::Kind::Namespace, "kube-system");
        assert!(router().route(&event(key)).is_empty());
    }
}
