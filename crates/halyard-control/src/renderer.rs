//! Renderer contract
//!
//! A renderer turns a subsystem's configuration record and its resolved
//! inputs into components. The orchestrator never looks at payload content;
//! it only consumes identities, ordering and readiness.

use crate::error::ControlResult;
use crate::gates::Preflight;
use crate::installation::InstallationSpec;
use async_trait::async_trait;
use halyard_apply::Component;
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Provider, SubsystemId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cluster-wide inputs shared by every renderer in a pass
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub provider: Provider,
    pub installation: InstallationSpec,
}

/// Inputs a renderer read from the store for one pass
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    inputs: BTreeMap<&'static str, Artifact>,
}

impl Resolved {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an input if it was found
    pub fn with(mut self, name: &'static str, artifact: Option<Artifact>) -> Self {
        if let Some(artifact) = artifact {
            self.inputs.insert(name, artifact);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.inputs.get(name)
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// Produces the components of one subsystem
#[async_trait]
pub trait Renderer: Send + Sync {
    fn subsystem(&self) -> SubsystemId;

    /// Cluster-wide gates that must be open before rendering
    fn preflight(&self) -> &'static [Preflight] {
        Preflight::ALL
    }

    /// Reject malformed records before anything else happens
    fn validate(&self, _record: &ConfigRecord) -> ControlResult<()> {
        Ok(())
    }

    /// Read the inputs `render` needs.
    ///
    /// An input that does not exist yet is `ControlError::Waiting`, a soft
    /// condition retried after the short backoff.
    async fn resolve(
        &self,
        store: &dyn Store,
        record: &ConfigRecord,
        ctx: &RenderContext,
    ) -> ControlResult<Resolved>;

    /// Build this pass's components, in apply order
    fn render(
        &self,
        record: &ConfigRecord,
        resolved: &Resolved,
        ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>>;

    /// Every identity this subsystem may create, in creation order.
    ///
    /// Derived from naming constants alone so teardown works without a
    /// record or any renderer output.
    fn teardown_identities(&self) -> Vec<ArtifactKey>;

    /// Inputs beyond the record whose changes should trigger a pass
    fn watches(&self) -> Vec<ArtifactKey> {
        Vec::new()
    }
}
