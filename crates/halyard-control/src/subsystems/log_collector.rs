//! Log collection agents

use super::{copy_secret, namespace, operator_input, require_cluster_config, storage_cluster_name};
use crate::error::{ControlError, ControlResult};
use crate::renderer::{RenderContext, Renderer, Resolved};
use async_trait::async_trait;
use halyard_apply::{Component, StaticComponent};
use halyard_store::Store;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, Kind, Provider, SubsystemId};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const FLUENTD_NAMESPACE: &str = "tigera-fluentd";
pub const FLUENTD_NAME: &str = "fluentd-node";
pub const FLUENTD_CONFIG_MAP_NAME: &str = "fluentd-config";
pub const FLUENTD_FILTER_CONFIG_MAP_NAME: &str = "fluentd-filters";
pub const S3_SECRET_NAME: &str = "log-collector-s3-credentials";
pub const S3_KEY_ID: &str = "key-id";
pub const S3_KEY_SECRET: &str = "key-secret";
pub const EKS_SECRET_NAME: &str = "tigera-eks-log-forwarder-secret";
pub const EKS_FORWARDER_NAME: &str = "eks-log-forwarder";
const FLUENTD_IMAGE: &str = "tigera/fluentd:v2.6.0";
const DEFAULT_EKS_STREAM_PREFIX: &str = "kube-apiserver-audit-";
const DEFAULT_EKS_FETCH_INTERVAL: u64 = 600;

const CLUSTER_CONFIG_INPUT: &str = "cluster-config";
const S3_INPUT: &str = "s3-credentials";
const FILTER_INPUT: &str = "filters";
const EKS_INPUT: &str = "eks-credentials";

/// Parsed syslog destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

/// Parse `scheme://host:port`, accepting tcp and udp
pub fn parse_syslog_endpoint(endpoint: &str) -> Result<SyslogEndpoint, String> {
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| format!("missing scheme in {:?}", endpoint))?;
    let protocol = scheme.to_lowercase();
    if protocol != "tcp" && protocol != "udp" {
        return Err(format!("unsupported protocol {:?}", scheme));
    }

    let (host, port) = rest
        .trim_end_matches('/')
        .rsplit_once(':')
        .ok_or_else(|| format!("missing port in {:?}", endpoint))?;
    if host.is_empty() {
        return Err(format!("missing host in {:?}", endpoint));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| format!("invalid port {:?}", port))?;

    Ok(SyslogEndpoint {
        protocol,
        host: host.to_string(),
        port,
    })
}

/// CloudWatch audit log source, only meaningful on EKS
#[derive(Debug, Clone, PartialEq, Eq)]
struct EksCloudwatchLog {
    region: String,
    group_name: String,
    stream_prefix: String,
    fetch_interval: u64,
}

impl EksCloudwatchLog {
    fn from_spec(spec: &Value) -> ControlResult<Self> {
        let field = |name: &str| spec.get(name).and_then(Value::as_str).unwrap_or_default();
        let invalid = |detail: &str| {
            ControlError::invalid("Error retrieving EKS Cloudwatch Logs configuration", detail)
        };

        let region = field("region");
        if region.is_empty() {
            return Err(invalid("Missing AWS region info"));
        }
        let group_name = field("groupName");
        if group_name.is_empty() {
            return Err(invalid("Missing Cloudwatch log group name"));
        }
        let stream_prefix = match field("streamPrefix") {
            "" => DEFAULT_EKS_STREAM_PREFIX,
            prefix => prefix,
        };
        let fetch_interval = match spec.get("fetchInterval").and_then(Value::as_u64) {
            None | Some(0) => DEFAULT_EKS_FETCH_INTERVAL,
            Some(n) => n,
        };

        Ok(Self {
            region: region.to_string(),
            group_name: group_name.to_string(),
            stream_prefix: stream_prefix.to_string(),
            fetch_interval,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogCollectorRenderer;

impl LogCollectorRenderer {
    fn eks_source(record: &ConfigRecord, provider: Provider) -> ControlResult<Option<EksCloudwatchLog>> {
        if provider != Provider::Eks {
            return Ok(None);
        }
        record
            .spec_field("additionalSources/eksCloudwatchLog")
            .filter(|v| !v.is_null())
            .map(EksCloudwatchLog::from_spec)
            .transpose()
    }

    fn effective_provider(ctx: &RenderContext) -> Provider {
        ctx.installation.kubernetes_provider.unwrap_or(ctx.provider)
    }
}

#[async_trait]
impl Renderer for LogCollectorRenderer {
    fn subsystem(&self) -> SubsystemId {
        SubsystemId::LogCollector
    }

    fn validate(&self, record: &ConfigRecord) -> ControlResult<()> {
        if let Some(endpoint) = record.spec_str("additionalStores/syslog/endpoint") {
            parse_syslog_endpoint(endpoint)
                .map_err(|e| ControlError::invalid("Syslog config has invalid Endpoint", e))?;
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

        let s3 = if record.spec_field("additionalStores/s3").is_some_and(|v| !v.is_null()) {
            let secret = store
                .get(&operator_input(Kind::Secret, S3_SECRET_NAME))
                .await?
                .ok_or_else(|| ControlError::waiting("S3 credential secret does not exist", ""))?;
            for field in [S3_KEY_ID, S3_KEY_SECRET] {
                if secret.data_entry(field).map_or(true, str::is_empty) {
                    return Err(ControlError::invalid(
                        "Error with S3 credential secret",
                        format!("Expected secret {:?} to have a field named {:?}", S3_SECRET_NAME, field),
                    ));
                }
            }
            Some(secret)
        } else {
            None
        };

        let filters = store
            .get(&operator_input(Kind::ConfigMap, FLUENTD_FILTER_CONFIG_MAP_NAME))
            .await?;

        // Without forwarder credentials the CloudWatch source is skipped
        let eks = match Self::eks_source(record, Self::effective_provider(ctx))? {
            Some(_) => store.get(&operator_input(Kind::Secret, EKS_SECRET_NAME)).await?,
            None => None,
        };

        Ok(Resolved::new()
            .with(CLUSTER_CONFIG_INPUT, Some(cluster_config))
            .with(S3_INPUT, s3)
            .with(FILTER_INPUT, filters)
            .with(EKS_INPUT, eks))
    }

    fn render(
        &self,
        record: &ConfigRecord,
        resolved: &Resolved,
        ctx: &RenderContext,
    ) -> ControlResult<Vec<Arc<dyn Component>>> {
        let mut data = Map::new();
        if let Some(config) = resolved.get(CLUSTER_CONFIG_INPUT) {
            data.insert("esClusterName".into(), json!(storage_cluster_name(config)));
        }
        if let Some(endpoint) = record.spec_str("additionalStores/syslog/endpoint") {
            let parsed = parse_syslog_endpoint(endpoint)
                .map_err(|e| ControlError::invalid("Syslog config has invalid Endpoint", e))?;
            data.insert("syslogProtocol".into(), json!(parsed.protocol));
            data.insert("syslogHost".into(), json!(parsed.host));
            data.insert("syslogPort".into(), json!(parsed.port.to_string()));
        }
        if let Some(s3) = record.spec_field("additionalStores/s3") {
            for (field, key) in [("bucketName", "s3BucketName"), ("bucketPath", "s3BucketPath"), ("region", "s3Region")] {
                if let Some(value) = s3.get(field).and_then(Value::as_str) {
                    data.insert(key.into(), json!(value));
                }
            }
        }
        if let Some(filters) = resolved.get(FILTER_INPUT) {
            for (field, key) in [("flow", "filterFlow"), ("dns", "filterDns")] {
                if let Some(value) = filters.data_entry(field) {
                    data.insert(key.into(), json!(value));
                }
            }
        }

        let mut component = StaticComponent::new("fluentd", vec![namespace(FLUENTD_NAMESPACE, ctx.provider)]);
        if let Some(secret) = resolved.get(S3_INPUT) {
            component.push(copy_secret(secret, FLUENTD_NAMESPACE));
        }
        component.push(Artifact::namespaced(
            Kind::ConfigMap,
            FLUENTD_NAMESPACE,
            FLUENTD_CONFIG_MAP_NAME,
            json!({ "data": data }),
        ));
        component.push(Artifact::namespaced(
            Kind::ServiceAccount,
            FLUENTD_NAMESPACE,
            FLUENTD_NAME,
            json!({}),
        ));
        component.push(Artifact::namespaced(
            Kind::DaemonSet,
            FLUENTD_NAMESPACE,
            FLUENTD_NAME,
            json!({
                "serviceAccountName": FLUENTD_NAME,
                "imagePullSecrets": ctx.installation.image_pull_secrets,
                "containers": [{"name": "fluentd", "image": ctx.installation.image(FLUENTD_IMAGE)}],
            }),
        ));

        if resolved.get(EKS_INPUT).is_some() {
            if let Some(eks) = Self::eks_source(record, Self::effective_provider(ctx))? {
                component.push(Artifact::namespaced(
                    Kind::Deployment,
                    FLUENTD_NAMESPACE,
                    EKS_FORWARDER_NAME,
                    json!({
                        "replicas": 1,
                        "containers": [{
                            "name": EKS_FORWARDER_NAME,
                            "image": ctx.installation.image(FLUENTD_IMAGE),
                            "env": {
                                "AWS_REGION": eks.region,
                                "EKS_CLOUDWATCH_LOG_GROUP": eks.group_name,
                                "EKS_CLOUDWATCH_LOG_STREAM_PREFIX": eks.stream_prefix,
                                "EKS_CLOUDWATCH_LOG_FETCH_INTERVAL": eks.fetch_interval.to_string(),
                            },
                        }],
                    }),
                ));
            }
        }

        Ok(vec![Arc::new(component)])
    }

    fn teardown_identities(&self) -> Vec<ArtifactKey> {
        vec![
            ArtifactKey::cluster(Kind::Namespace, FLUENTD_NAMESPACE),
            ArtifactKey::namespaced(Kind::Secret, FLUENTD_NAMESPACE, S3_SECRET_NAME),
            ArtifactKey::namespaced(Kind::ConfigMap, FLUENTD_NAMESPACE, FLUENTD_CONFIG_MAP_NAME),
            ArtifactKey::namespaced(Kind::ServiceAccount, FLUENTD_NAMESPACE, FLUENTD_NAME),
            ArtifactKey::namespaced(Kind::DaemonSet, FLUENTD_NAMESPACE, FLUENTD_NAME),
            ArtifactKey::namespaced(Kind::Deployment, FLUENTD_NAMESPACE, EKS_FORWARDER_NAME),
        ]
    }

    fn watches(&self) -> Vec<ArtifactKey> {
        vec![
            super::cluster_config_key(),
            operator_input(Kind::Secret, S3_SECRET_NAME),
            operator_input(Kind::ConfigMap, FLUENTD_FILTER_CONFIG_MAP_NAME),
            operator_input(Kind::Secret, EKS_SECRET_NAME),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::testing::{keys, record, render_ctx};
    use crate::subsystems::{cluster_config_key, OPERATOR_NAMESPACE};
    use halyard_store::InMemoryStore;

    fn collector(spec: Value) -> ConfigRecord {
        record(SubsystemId::LogCollector, json!({ "spec": spec }))
    }

    async fn store_with_cluster_config() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .seed(Artifact::new(
                cluster_config_key(),
                json!({"data": {"clusterName": "prod"}}),
            ))
            .await;
        store
    }

    #[test]
    fn test_parse_syslog_endpoint() {
        assert_eq!(
            parse_syslog_endpoint("tcp://1.2.3.4:514").unwrap(),
            SyslogEndpoint {
                protocol: "tcp".into(),
                host: "1.2.3.4".into(),
                port: 514
            }
        );
        assert!(parse_syslog_endpoint("UDP://logs.example.com:601").is_ok());
        assert!(parse_syslog_endpoint("1.2.3.4:514").is_err());
        assert!(parse_syslog_endpoint("http://1.2.3.4:514").is_err());
        assert!(parse_syslog_endpoint("tcp://1.2.3.4").is_err());
        assert!(parse_syslog_endpoint("tcp://:514").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_syslog_endpoint() {
        let renderer = LogCollectorRenderer;
        let bad = collector(json!({"additionalStores": {"syslog": {"endpoint": "1.2.3.4"}}}));
        let err = renderer.validate(&bad).unwrap_err();
        assert_eq!(err.to_string(), "Syslog config has invalid Endpoint");
        assert!(renderer.validate(&collector(json!({}))).is_ok());
    }

    #[tokio::test]
    async fn test_waits_for_cluster_config() {
        let store = InMemoryStore::new();
        let err = LogCollectorRenderer
            .resolve(&store, &collector(json!({})), &render_ctx(Provider::None))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Waiting { .. }));
    }

    #[tokio::test]
    async fn test_s3_secret_missing_is_waiting() {
        let store = store_with_cluster_config().await;
        let record = collector(json!({"additionalStores": {"s3": {"bucketName": "logs"}}}));

        let err = LogCollectorRenderer
            .resolve(&store, &record, &render_ctx(Provider::None))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "S3 credential secret does not exist");
        assert!(matches!(err, ControlError::Waiting { .. }));

        store
            .seed(Artifact::namespaced(
                Kind::Secret,
                OPERATOR_NAMESPACE,
                S3_SECRET_NAME,
                json!({"data": {"key-id": "id"}}),
            ))
            .await;
        let err = LogCollectorRenderer
            .resolve(&store, &record, &render_ctx(Provider::None))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_render_with_all_inputs() {
        let store = store_with_cluster_config().await;
        store
            .seed(Artifact::namespaced(
                Kind::Secret,
                OPERATOR_NAMESPACE,
                S3_SECRET_NAME,
                json!({"data": {"key-id": "id", "key-secret": "secret"}}),
            ))
            .await;
        store
            .seed(Artifact::namespaced(
                Kind::Secret,
                OPERATOR_NAMESPACE,
                EKS_SECRET_NAME,
                json!({"data": {"aws-id": "a", "aws-key": "b"}}),
            ))
            .await;

        let record = collector(json!({
            "additionalStores": {
                "s3": {"bucketName": "logs", "region": "us-west-2"},
                "syslog": {"endpoint": "udp://10.0.0.1:514"},
            },
            "additionalSources": {"eksCloudwatchLog": {"region": "us-west-2", "groupName": "/aws/eks/audit"}},
        }));
        let ctx = render_ctx(Provider::Eks);
        let renderer = LogCollectorRenderer;
        let resolved = renderer.resolve(&store, &record, &ctx).await.unwrap();
        let components = renderer.render(&record, &resolved, &ctx).unwrap();

        assert_eq!(keys(&components), renderer.teardown_identities());

        let objects = components[0].objects();
        let config = objects.iter().find(|a| a.key.name == FLUENTD_CONFIG_MAP_NAME).unwrap();
        assert_eq!(config.data_entry("esClusterName"), Some("prod"));
        assert_eq!(config.data_entry("syslogPort"), Some("514"));
        assert_eq!(config.data_entry("s3BucketName"), Some("logs"));

        let forwarder = objects.iter().find(|a| a.key.name == EKS_FORWARDER_NAME).unwrap();
        let env = &forwarder.payload["containers"][0]["env"];
        assert_eq!(env["EKS_CLOUDWATCH_LOG_STREAM_PREFIX"], DEFAULT_EKS_STREAM_PREFIX);
        assert_eq!(env["EKS_CLOUDWATCH_LOG_FETCH_INTERVAL"], "600");
    }

    #[tokio::test]
    async fn test_eks_source_requires_region() {
        let store = store_with_cluster_config().await;
        let record = collector(json!({
            "additionalSources": {"eksCloudwatchLog": {"groupName": "g"}},
        }));
        let err = LogCollectorRenderer
            .resolve(&store, &record, &render_ctx(Provider::Eks))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Invalid { ref detail, .. } if detail == "Missing AWS region info"));

        // Ignored off EKS
        assert!(LogCollectorRenderer
            .resolve(&store, &record, &render_ctx(Provider::Gke))
            .await
            .is_ok());
    }
}
