//! Management web console

use super::{copy_secret, namespace, operator_input, require_cluster_config, storage_cluster_name};
use crate::error::{ControlError, ControlResult};
use crate::renderer::{RenderContext, Renderer, Resolved};
use async_trait::async_trait;
use halyard_apply::{Component, StaticComponent};
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Kind, SubsystemId};
use serde_json::json;
use std::sync::Arc;

pub const MANAGER_NAMESPACE: &str = "tigera-manager";
pub const MANAGER_NAME: &str = "tigera-manager";
pub const MANAGER_ROLE_NAME: &str = "tigera-manager-role";
pub const MANAGER_BINDING_NAME: &str = "tigera-manager-binding";
pub const OIDC_CONFIG_MAP_NAME: &str = "tigera-manager-oidc-config";
pub const TUNNEL_SECRET_NAME: &str = "tigera-management-cluster-connection";
const MANAGER_IMAGE: &str = "tigera/cnx-manager:v2.6.0";
const VOLTRON_IMAGE: &str = "tigera/voltron:v2.6.0";
const MANAGER_PORT: u16 = 9443;

/// Auth types the console accepts; the first is the default
const AUTH_TYPES: &[&str] = &["Token", "Basic", "OIDC", "OAuth"];

const CLUSTER_CONFIG_INPUT: &str = "cluster-config";
const OIDC_INPUT: &str = "oidc-config";
const TUNNEL_INPUT: &str = "tunnel-secret";

#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerRenderer;

impl ManagerRenderer {
    fn auth_type(record: &ConfigRecord) -> &str {
        match record.spec_str("auth/type") {
            None | Some("") => AUTH_TYPES[0],
            Some(kind) => kind,
        }
    }
}

#[async_trait]
impl Renderer for ManagerRenderer {
    fn subsystem(&self) -> SubsystemId {
        SubsystemId::Manager
    }

    fn validate(&self, record: &ConfigRecord) -> ControlResult<()> {
        let auth = Self::auth_type(record);
        if !AUTH_TYPES.contains(&auth) {
            return Err(ControlError::invalid(
                "Invalid Manager auth type",
                format!("auth type {:?} is not one of {}", auth, AUTH_TYPES.join(", ")),
            ));
        }
        Ok(())
    }

    async fn resolve(
        &self,
        store: &dyn Store,
        record: &ConfigRecord,
        ctx: &RenderContext,
    ) -> ControlResult<Resolved> {
        let cluster_config = require_cluster_config(store).await?;

        let oidc = store
            .get(&operator_input(Kind::ConfigMap, OIDC_CONFIG_MAP_NAME))
            .await?;
        let authority = record.spec_str("auth/authority").unwrap_or_default();
        if oidc.is_some() && !authority.is_empty() {
            return Err(ControlError::invalid(
                "Both OIDC configuration and Authority cannot be set at the same time",
                format!("remove spec.auth.authority or the {} config map", OIDC_CONFIG_MAP_NAME),
            ));
        }

        let tunnel = if ctx.installation.is_management_cluster() {
            let secret = store
                .get(&operator_input(Kind::Secret, TUNNEL_SECRET_NAME))
                .await?
                .ok_or_else(|| {
                    ControlError::waiting(
                        "Management cluster tunnel secret does not exist",
                        format!("{} not found", operator_input(Kind::Secret, TUNNEL_SECRET_NAME)),
                    )
                })?;
            Some(secret)
        } else {
            None
        };

        Ok(Resolved::new()
            .with(CLUSTER_CONFIG_INPUT, Some(cluster_config))
            .with(OIDC_INPUT, oidc)
            .with(TUNNEL_INPUT, tunnel))
    }

    fn render(
        &self,
        record: &ConfigRecord,
        resolved: &Resolved,
        ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>> {
        let cluster_name = resolved
            .get(CLUSTER_CONFIG_INPUT)
            .map(storage_cluster_name)
            .unwrap_or_default();

        let mut env = serde_json::Map::new();
        env.insert("CNX_WEB_AUTHENTICATION_TYPE".into(), json!(Self::auth_type(record)));
        env.insert("ELASTIC_CLUSTER_NAME".into(), json!(cluster_name));
        if let Some(authority) = record.spec_str("auth/authority").filter(|a| !a.is_empty()) {
            env.insert("CNX_WEB_OIDC_AUTHORITY".into(), json!(authority));
        }
        if let Some(client_id) = record.spec_str("auth/clientID") {
            env.insert("CNX_WEB_OIDC_CLIENT_ID".into(), json!(client_id));
        }
        if let Some(oidc) = resolved.get(OIDC_INPUT) {
            env.insert("CNX_WEB_OIDC_CONFIG_MAP".into(), json!(oidc.key.name));
        }

        let mut containers = vec![json!({
            "name": "tigera-manager",
            "image": ctx.installation.image(MANAGER_IMAGE),
            "env": env,
        })];
        let tunnel = resolved.get(TUNNEL_INPUT);
        if tunnel.is_some() {
            containers.push(json!({
                "name": "tigera-voltron",
                "image": ctx.installation.image(VOLTRON_IMAGE),
                "env": {"VOLTRON_TUNNEL_SECRET": TUNNEL_SECRET_NAME},
            }));
        }

        let mut component = StaticComponent::new("manager", vec![namespace(MANAGER_NAMESPACE, ctx.provider)]);
        if let Some(secret) = tunnel {
            component.push(copy_secret(secret, MANAGER_NAMESPACE));
        }
        component.push(Artifact::namespaced(
            Kind::ServiceAccount,
            MANAGER_NAMESPACE,
            MANAGER_NAME,
            json!({}),
        ));
        component.push(Artifact::cluster(
            Kind::ClusterRole,
            MANAGER_ROLE_NAME,
            json!({"rules": [{
                "apiGroups": ["authorization.k8s.io"],
                "resources": ["subjectaccessreviews"],
                "verbs": ["create"],
            }]}),
        ));
        component.push(Artifact::cluster(
            Kind::ClusterRoleBinding,
            MANAGER_BINDING_NAME,
            json!({
                "roleRef": {"kind": "ClusterRole", "name": MANAGER_ROLE_NAME},
                "subjects": [{"kind": "ServiceAccount", "name": MANAGER_NAME, "namespace": MANAGER_NAMESPACE}],
            }),
        ));
        component.push(Artifact::namespaced(
            Kind::Service,
            MANAGER_NAMESPACE,
            MANAGER_NAME,
            json!({"ports": [{"port": MANAGER_PORT, "targetPort": MANAGER_PORT}], "selector": {"k8s-app": MANAGER_NAME}}),
        ));
        component.push(Artifact::namespaced(
            Kind::Deployment,
            MANAGER_NAMESPACE,
            MANAGER_NAME,
            json!({
                "replicas": 1,
                "serviceAccountName": MANAGER_NAME,
                "imagePullSecrets": ctx.installation.image_pull_secrets,
                "containers": containers,
            }),
        ));

        Ok(vec![Arc::new(component)])
    }

    fn teardown_identities(&self) -> Vec<ArtifactKey> {
        vec![
            ArtifactKey::cluster(Kind::Namespace, MANAGER_NAMESPACE),
            ArtifactKey::namespaced(Kind::Secret, MANAGER_NAMESPACE, TUNNEL_SECRET_NAME),
            ArtifactKey::namespaced(Kind::ServiceAccount, MANAGER_NAMESPACE, MANAGER_NAME),
            ArtifactKey::cluster(Kind::ClusterRole, MANAGER_ROLE_NAME),
            ArtifactKey::cluster(Kind::ClusterRoleBinding, MANAGER_BINDING_NAME),
            ArtifactKey::namespaced(Kind::Service, MANAGER_NAMESPACE, MANAGER_NAME),
            ArtifactKey::namespaced(Kind::Deployment, MANAGER_NAMESPACE, MANAGER_NAME),
        ]
    }

    fn watches(&self) -> Vec<ArtifactKey> {
        vec![
            super::cluster_config_key(),
            operator_input(Kind::ConfigMap, OIDC_CONFIG_MAP_NAME),
            operator_input(Kind::Secret, TUNNEL_SECRET_NAME),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installation::ClusterManagementType;
    use crate::subsystems::testing::{keys, record, render_ctx};
    use crate::subsystems::{cluster_config_key, OPERATOR_NAMESPACE};
    use halyard_store::InMemoryStore;
    use halyard_types::Provider;
    use serde_json::Value;

    fn manager(spec: Value) -> ConfigRecord {
        record(SubsystemId::Manager, json!({ "spec": spec }))
    }

    async fn store_with_cluster_config() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .seed(Artifact::new(cluster_config_key(), json!({"data": {"clusterName": "prod"}})))
            .await;
        store
    }

    #[test]
    fn test_auth_type_defaults_to_token() {
        let renderer = ManagerRenderer;
        assert_eq!(ManagerRenderer::auth_type(&manager(json!({}))), "Token");
        assert!(renderer.validate(&manager(json!({}))).is_ok());
        assert!(renderer.validate(&manager(json!({"auth": {"type": "OIDC"}}))).is_ok());
        assert!(renderer.validate(&manager(json!({"auth": {"type": "Kerberos"}}))).is_err());
    }

    #[tokio::test]
    async fn test_oidc_and_authority_are_exclusive() {
        let store = store_with_cluster_config().await;
        store
            .seed(Artifact::namespaced(
                Kind::ConfigMap,
                OPERATOR_NAMESPACE,
                OIDC_CONFIG_MAP_NAME,
                json!({"data": {}}),
            ))
            .await;
        let record = manager(json!({"auth": {"type": "OIDC", "authority": "https://idp.example.com"}}));

        let err = ManagerRenderer
            .resolve(&store, &record, &render_ctx(Provider::None))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Both OIDC configuration and Authority cannot be set at the same time"
        );
    }

    #[tokio::test]
    async fn test_management_cluster_waits_for_tunnel_secret() {
        let store = store_with_cluster_config().await;
        let mut ctx = render_ctx(Provider::None);
        ctx.installation.cluster_management_type = ClusterManagementType::Management;

        let err = ManagerRenderer
            .resolve(&store, &manager(json!({})), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Waiting { .. }));

        store
            .seed(Artifact::namespaced(
                Kind::Secret,
                OPERATOR_NAMESPACE,
                TUNNEL_SECRET_NAME,
                json!({"data": {"cert": "c", "key": "k"}}),
            ))
            .await;
        let renderer = ManagerRenderer;
        let record = manager(json!({}));
        let resolved = renderer.resolve(&store, &record, &ctx).await.unwrap();
        let components = renderer.render(&record, &resolved, &ctx).unwrap();

        assert_eq!(keys(&components), renderer.teardown_identities());
        let deployment = components[0].objects().pop().unwrap();
        assert_eq!(deployment.payload["containers"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            deployment.payload["containers"][0]["env"]["ELASTIC_CLUSTER_NAME"],
            "prod"
        );
    }

    #[tokio::test]
    async fn test_standalone_skips_tunnel() {
        let store = store_with_cluster_config().await;
        let renderer = ManagerRenderer;
        let record = manager(json!({}));
        let ctx = render_ctx(Provider::None);
        let resolved = renderer.resolve(&store, &record, &ctx).await.unwrap();
        let rendered = keys(&renderer.render(&record, &resolved, &ctx).unwrap());

        assert!(rendered.iter().all(|k| k.kind != Kind::Secret));
        assert_eq!(rendered.len(), renderer.teardown_identities().len() - 1);
    }
}
