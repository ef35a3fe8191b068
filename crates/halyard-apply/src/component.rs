//! Rendered components
//!
//! A component is an ordered sequence of artifacts plus a readiness
//! predicate. Components are built fresh by a renderer on every pass and
//! never mutated afterwards.

use halyard_types::Artifact;
use std::fmt;
use std::sync::Arc;

/// Output contract of a renderer
pub trait Component: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Artifacts in the order they must be applied
    fn objects(&self) -> Vec<Artifact>;

    /// Whether the component is ready; evaluated on demand, never cached
    fn ready(&self) -> bool;
}

type ReadyFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Component with a fixed artifact list
#[derive(Clone)]
pub struct StaticComponent {
    name: String,
    objects: Vec<Artifact>,
    ready: ReadyFn,
}

impl StaticComponent {
    /// A component that is always ready
    pub fn new(name: impl Into<String>, objects: Vec<Artifact>) -> Self {
        Self {
            name: name.into(),
            objects,
            ready: Arc::new(|| true),
        }
    }

    /// Replace the readiness predicate
    pub fn ready_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.ready = Arc::new(predicate);
        self
    }

    pub fn push(&mut self, artifact: Artifact) {
        self.objects.push(artifact);
    }
}

impl fmt::Debug for StaticComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticComponent")
            .field("name", &self.name)
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Component for StaticComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn objects(&self) -> Vec<Artifact> {
        self.objects.clone()
    }

    fn ready(&self) -> bool {
        (self.ready)()
    }
}
