//! Log storage cluster

use super::{namespace, operator_input, OPERATOR_NAMESPACE};
use crate::error::{ControlError, ControlResult};
use crate::installation::ClusterManagementType;
use crate::renderer::{RenderContext, Renderer, Resolved};
use async_trait::async_trait;
use halyard_apply::{Component, StaticComponent};
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Kind, SubsystemId};
use serde_json::{json, Value};
use std::sync::Arc;

pub const ELASTICSEARCH_NAMESPACE: &str = "tigera-elasticsearch";
pub const ELASTICSEARCH_NAME: &str = "tigera-secure";
/// Config map published in the operator namespace for log consumers
pub const CLUSTER_CONFIG_NAME: &str = "tigera-secure-elasticsearch";
pub(crate) const DEFAULT_CLUSTER_NAME: &str = "cluster";
const ELASTICSEARCH_IMAGE: &str = "tigera/elasticsearch:7.3";
const DEFAULT_NODE_COUNT: u64 = 1;
const DEFAULT_REPLICAS: u64 = 0;
const DEFAULT_SHARDS: u64 = 5;

const STORAGE_CLUSTER_INPUT: &str = "storage-cluster";

pub fn storage_cluster_key() -> ArtifactKey {
    ArtifactKey::namespaced(Kind::StorageCluster, ELASTICSEARCH_NAMESPACE, ELASTICSEARCH_NAME)
}

pub fn cluster_config_key() -> ArtifactKey {
    operator_input(Kind::ConfigMap, CLUSTER_CONFIG_NAME)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogStorageRenderer;

impl LogStorageRenderer {
    fn count(record: &ConfigRecord, path: &str, default: u64, min: u64) -> ControlResult<u64> {
        match record.spec_field(path) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .filter(|n| *n >= min)
                .ok_or_else(|| {
                    ControlError::invalid(
                        "Invalid LogStorage spec",
                        format!("{} must be an integer >= {}, got {}", path, min, value),
                    )
                }),
        }
    }
}

#[async_trait]
impl Renderer for LogStorageRenderer {
    fn subsystem(&self) -> SubsystemId {
        SubsystemId::LogStorage
    }

    fn validate(&self, record: &ConfigRecord) -> ControlResult<()> {
        Self::count(record, "nodes/count", DEFAULT_NODE_COUNT, 1)?;
        Self::count(record, "indices/replicas", DEFAULT_REPLICAS, 0)?;
        Self::count(record, "indices/shards", DEFAULT_SHARDS, 1)?;
        Ok(())
    }

    async fn resolve(
        &self,
        store: &dyn Store,
        _record: &ConfigRecord,
        ctx: &RenderContext,
    ) -> ControlResult<Resolved> {
        if ctx.installation.cluster_management_type == ClusterManagementType::Managed {
            return Err(ControlError::invalid(
                "Invalid LogStorage configuration",
                "cluster type is Managed but logstorage still exists",
            ));
        }

        // Written by the external storage operator; absent until first apply
        let live = store.get(&storage_cluster_key()).await?;
        Ok(Resolved::new().with(STORAGE_CLUSTER_INPUT, live))
    }

    fn render(
        &self,
        record: &ConfigRecord,
        resolved: &Resolved,
        ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>> {
        let nodes = Self::count(record, "nodes/count", DEFAULT_NODE_COUNT, 1)?;
        let replicas = Self::count(record, "indices/replicas", DEFAULT_REPLICAS, 0)?;
        let shards = Self::count(record, "indices/shards", DEFAULT_SHARDS, 1)?;

        let phase = resolved
            .get(STORAGE_CLUSTER_INPUT)
            .and_then(|live| live.status.get("phase"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let component = StaticComponent::new(
            "elasticsearch",
            vec![
                namespace(ELASTICSEARCH_NAMESPACE, ctx.provider),
                Artifact::namespaced(
                    Kind::StorageCluster,
                    ELASTICSEARCH_NAMESPACE,
                    ELASTICSEARCH_NAME,
                    json!({
                        "version": "7.3.2",
                        "image": ctx.installation.image(ELASTICSEARCH_IMAGE),
                        "nodeSets": [{"name": "default", "count": nodes}],
                    }),
                ),
                Artifact::namespaced(
                    Kind::ConfigMap,
                    OPERATOR_NAMESPACE,
                    CLUSTER_CONFIG_NAME,
                    json!({"data": {
                        "clusterName": DEFAULT_CLUSTER_NAME,
                        "replicas": replicas.to_string(),
                        "shards": shards.to_string(),
                    }}),
                ),
            ],
        )
        .ready_when(move || phase.as_deref() == Some("Ready"));

        Ok(vec![Arc::new(component)])
    }

    fn teardown_identities(&self) -> Vec<ArtifactKey> {
        vec![
            ArtifactKey::cluster(Kind::Namespace, ELASTICSEARCH_NAMESPACE),
            storage_cluster_key(),
            cluster_config_key(),
        ]
    }

    fn watches(&self) -> Vec<ArtifactKey> {
        vec![storage_cluster_key()]
    }
}
