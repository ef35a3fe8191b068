//! The four standard subsystem renderers
//!
//! Artifact content is kept to what identity, ordering and readiness need.

mod cluster_connection;
mod log_collector;
mod log_storage;
mod manager;

pub use cluster_connection::{validate_cluster_addr, ClusterConnectionRenderer};
pub use log_collector::{parse_syslog_endpoint, LogCollectorRenderer, SyslogEndpoint};
pub use log_storage::{cluster_config_key, storage_cluster_key, LogStorageRenderer};
pub use manager::ManagerRenderer;

use crate::error::{ControlError, ControlResult};
use crate::renderer::Renderer;
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, Kind, Provider};
use serde_json::json;
use std::sync::Arc;

/// Namespace the operator and its user-provided inputs live in
pub const OPERATOR_NAMESPACE: &str = "tigera-operator";

/// One renderer per subsystem
pub fn standard_renderers() -> Vec<Arc<dyn Renderer>> {
    vec![
        Arc::new(ClusterConnectionRenderer),
        Arc::new(LogStorageRenderer),
        Arc::new(LogCollectorRenderer),
        Arc::new(ManagerRenderer),
    ]
}

pub(crate) fn operator_input(kind: Kind, name: &str) -> ArtifactKey {
    ArtifactKey::namespaced(kind, OPERATOR_NAMESPACE, name)
}

/// Namespace artifact; OpenShift needs run-level labels to schedule into it
pub(crate) fn namespace(name: &str, provider: Provider) -> Artifact {
    let mut ns = Artifact::cluster(Kind::Namespace, name, json!({})).with_label("name", name);
    if provider.is_openshift() {
        ns.labels
            .insert("openshift.io/run-level".to_string(), "0".to_string());
        ns.annotations
            .insert("openshift.io/node-selector".to_string(), String::new());
    }
    ns
}

/// Copy of a secret from the operator namespace into `namespace`
pub(crate) fn copy_secret(source: &Artifact, namespace: &str) -> Artifact {
    let data = source.payload.get("data").cloned().unwrap_or_else(|| json!({}));
    Artifact::namespaced(Kind::Secret, namespace, &source.key.name, json!({ "data": data }))
}

/// Read the log storage cluster configuration published for consumers
pub(crate) async fn require_cluster_config(store: &dyn Store) -> ControlResult<Artifact> {
    store.get(&cluster_config_key()).await?.ok_or_else(|| {
        ControlError::waiting(
            "Elasticsearch cluster configuration is not available, waiting for it to become available",
            format!("{} not found", cluster_config_key()),
        )
    })
}

/// Cluster name from the published storage configuration
pub(crate) fn storage_cluster_name(config: &Artifact) -> String {
    config
        .data_entry("clusterName")
        .unwrap_or(log_storage::DEFAULT_CLUSTER_NAME)
        .to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::installation::InstallationSpec;
    use crate::renderer::RenderContext;
    use halyard_apply::Component;
    use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Provider, SubsystemId};
    use serde_json::Value;
    use std::sync::Arc;

    pub fn record(subsystem: SubsystemId, payload: Value) -> ConfigRecord {
        let key = subsystem.record_key();
        ConfigRecord::new(Artifact::cluster(key.kind, &key.name, payload))
    }

    pub fn render_ctx(provider: Provider) -> RenderContext {
        RenderContext {
            provider,
            installation: InstallationSpec {
                registry: "quay.io/".into(),
                kubernetes_provider: Some(provider),
                ..Default::default()
            },
        }
    }

    pub fn keys(components: &[Arc<dyn Component>]) -> Vec<ArtifactKey> {
        components
            .iter()
            .flat_map(|c| c.objects())
            .map(|a| a.key)
            .collect()
    }
}
