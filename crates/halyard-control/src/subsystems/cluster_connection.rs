//! Connectivity gateway from a managed cluster to its management cluster

use super::{copy_secret, namespace, operator_input};
use crate::error::{ControlError, ControlResult};
use crate::gates::Preflight;
use crate::renderer::{RenderContext, Renderer, Resolved};
use async_trait::async_trait;
use halyard_apply::{Component, StaticComponent};
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Kind, SubsystemId};
use serde_json::json;
use std::sync::Arc;

pub const GUARDIAN_NAMESPACE: &str = "tigera-guardian";
pub const GUARDIAN_NAME: &str = "tigera-guardian";
pub const GUARDIAN_CONFIG_MAP_NAME: &str = "tigera-guardian-config";
pub const GUARDIAN_SECRET_NAME: &str = "tigera-managed-cluster-connection";
const GUARDIAN_IMAGE: &str = "tigera/guardian:v2.6.0";
const DEFAULT_CLUSTER_NAME: &str = "cluster";

const SECRET_INPUT: &str = "guardian-secret";

/// Check a management cluster address is `host:port` with a numeric port
pub fn validate_cluster_addr(addr: &str) -> Result<(), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("missing port in address {:?}", addr))?;
    if host.is_empty() {
        return Err(format!("missing host in address {:?}", addr));
    }
    port.parse::<u16>()
        .map_err(|_| format!("invalid port {:?} in address {:?}", port, addr))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClusterConnectionRenderer;

impl ClusterConnectionRenderer {
    fn source_secret_key() -> ArtifactKey {
        operator_input(Kind::Secret, GUARDIAN_SECRET_NAME)
    }
}

#[async_trait]
impl Renderer for ClusterConnectionRenderer {
    fn subsystem(&self) -> SubsystemId {
        SubsystemId::ClusterConnection
    }

    fn preflight(&self) -> &'static [Preflight] {
        &[Preflight::Installation]
    }

    fn validate(&self, record: &ConfigRecord) -> ControlResult<()> {
        let addr = record.spec_str("managementClusterAddr").unwrap_or_default();
        validate_cluster_addr(addr)
            .map_err(|e| ControlError::invalid("Invalid management cluster address", e))
    }

    async fn resolve(
        &self,
        store: &dyn Store,
        _record: &ConfigRecord,
        _ctx: &RenderContext,
    ) -> ControlResult<Resolved> {
        // The secret is optional; without it the gateway starts unauthenticated
        let secret = store.get(&Self::source_secret_key()).await?;
        Ok(Resolved::new().with(SECRET_INPUT, secret))
    }

    fn render(
        &self,
        record: &ConfigRecord,
        resolved: &Resolved,
        ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>> {
        let addr = record.spec_str("managementClusterAddr").unwrap_or_default();
        let cluster_name = record.spec_str("clusterName").unwrap_or(DEFAULT_CLUSTER_NAME);

        let mut component = StaticComponent::new("guardian", vec![namespace(GUARDIAN_NAMESPACE, ctx.provider)]);

        if let Some(secret) = resolved.get(SECRET_INPUT) {
            component.push(copy_secret(secret, GUARDIAN_NAMESPACE));
        }

        component.push(Artifact::namespaced(
            Kind::ServiceAccount,
            GUARDIAN_NAMESPACE,
            GUARDIAN_NAME,
            json!({}),
        ));
        component.push(Artifact::namespaced(
            Kind::ConfigMap,
            GUARDIAN_NAMESPACE,
            GUARDIAN_CONFIG_MAP_NAME,
            json!({"data": {"managementClusterAddr": addr, "clusterName": cluster_name}}),
        ));
        component.push(Artifact::cluster(
            Kind::ClusterRole,
            GUARDIAN_NAME,
            json!({"rules": [{
                "apiGroups": [""],
                "resources": ["users", "groups", "serviceaccounts"],
                "verbs": ["impersonate"],
            }]}),
        ));
        component.push(Artifact::cluster(
            Kind::ClusterRoleBinding,
            GUARDIAN_NAME,
            json!({
                "roleRef": {"kind": "ClusterRole", "name": GUARDIAN_NAME},
                "subjects": [{"kind": "ServiceAccount", "name": GUARDIAN_NAME, "namespace": GUARDIAN_NAMESPACE}],
            }),
        ));
        component.push(Artifact::namespaced(
            Kind::Deployment,
            GUARDIAN_NAMESPACE,
            GUARDIAN_NAME,
            json!({
                "replicas": 1,
                "serviceAccountName": GUARDIAN_NAME,
                "imagePullSecrets": ctx.installation.image_pull_secrets,
                "containers": [{
                    "name": GUARDIAN_NAME,
                    "image": ctx.installation.image(GUARDIAN_IMAGE),
                    "env": {
                        "GUARDIAN_VOLTRON_URL": addr,
                        "GUARDIAN_CLUSTER_NAME": cluster_name,
                    },
                }],
            }),
        ));

        Ok(vec![Arc::new(component)])
    }

    fn teardown_identities(&self) -> Vec<ArtifactKey> {
        vec![
            ArtifactKey::cluster(Kind::Namespace, GUARDIAN_NAMESPACE),
            ArtifactKey::namespaced(Kind::Secret, GUARDIAN_NAMESPACE, GUARDIAN_SECRET_NAME),
            ArtifactKey::namespaced(Kind::ServiceAccount, GUARDIAN_NAMESPACE, GUARDIAN_NAME),
            ArtifactKey::namespaced(Kind::ConfigMap, GUARDIAN_NAMESPACE, GUARDIAN_CONFIG_MAP_NAME),
            ArtifactKey::cluster(Kind::ClusterRole, GUARDIAN_NAME),
            ArtifactKey::cluster(Kind::ClusterRoleBinding, GUARDIAN_NAME),
            ArtifactKey::namespaced(Kind::Deployment, GUARDIAN_NAMESPACE, GUARDIAN_NAME),
        ]
    }

    fn watches(&self) -> Vec<ArtifactKey> {
        vec![Self::source_secret_key()]
    }
}
