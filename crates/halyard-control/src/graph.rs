//! Static dependency edges between subsystems

use crate::error::{ControlError, ControlResult};
use halyard_types::SubsystemId;
use std::collections::{BTreeMap, BTreeSet};

/// Directed "requires Available" relation between subsystems
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    upstreams: BTreeMap<SubsystemId, Vec<SubsystemId>>,
    order: Vec<SubsystemId>,
}

impl DependencyGraph {
    /// Build a graph from `(dependent, upstream)` edges, rejecting cycles
    pub fn new(edges: &[(SubsystemId, SubsystemId)]) -> ControlResult<Self> {
        let mut upstreams: BTreeMap<SubsystemId, Vec<SubsystemId>> = BTreeMap::new();
        for &(dependent, upstream) in edges {
            let entry = upstreams.entry(dependent).or_default();
            if !entry.contains(&upstream) {
                entry.push(upstream);
            }
        }

        let order = topological_order(&upstreams)?;
        Ok(Self { upstreams, order })
    }

    /// Log collection and the management UI both need log storage
    pub fn standard() -> Self {
        let upstreams = BTreeMap::from([
            (SubsystemId::LogCollector, vec![SubsystemId::LogStorage]),
            (SubsystemId::Manager, vec![SubsystemId::LogStorage]),
        ]);
        let order = vec![
            SubsystemId::ClusterConnection,
            SubsystemId::LogStorage,
            SubsystemId::LogCollector,
            SubsystemId::Manager,
        ];
        Self { upstreams, order }
    }

    /// Subsystems that must be Available before `id` is rendered
    pub fn upstreams(&self, id: SubsystemId) -> &[SubsystemId] {
        self.upstreams.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Subsystems gated on `id`
    pub fn downstreams(&self, id: SubsystemId) -> Vec<SubsystemId> {
        self.upstreams
            .iter()
            .filter(|(_, ups)| ups.contains(&id))
            .map(|(&dependent, _)| dependent)
            .collect()
    }

    /// Every subsystem, upstreams before their dependents
    pub fn order(&self) -> &[SubsystemId] {
        &self.order
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::standard()
    }
}

fn topological_order(
    upstreams: &BTreeMap<SubsystemId, Vec<SubsystemId>>,
) -> ControlResult<Vec<SubsystemId>> {
    let mut order = Vec::with_capacity(SubsystemId::ALL.len());
    let mut placed = BTreeSet::new();

    while order.len() < SubsystemId::ALL.len() {
        let ready: Vec<SubsystemId> = SubsystemId::ALL
            .iter()
            .copied()
            .filter(|id| !placed.contains(id))
            .filter(|id| {
                upstreams
                    .get(id)
                    .map_or(true, |ups| ups.iter().all(|u| placed.contains(u)))
            })
            .collect();

        let Some(&stuck) = SubsystemId::ALL.iter().find(|id| !placed.contains(*id)) else {
            break;
        };
        if ready.is_empty() {
            return Err(ControlError::Cycle(stuck));
        }

        for id in ready {
            placed.insert(id);
            order.push(id);
        }
    }

    Ok(order)
}
