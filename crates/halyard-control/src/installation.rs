//! Installation record and its defaulting rules
//!
//! Every renderer reads the cluster-wide installation record for the image
//! registry, the provider and the multi-cluster role. Defaults are filled
//! in memory on every read; the stored record is never rewritten.

use crate::error::{ControlError, ControlResult};
use halyard_store::Store;
use halyard_types::{ArtifactKey, ConfigRecord, Kind, Provider};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Name of the singleton installation record
pub const INSTALLATION_NAME: &str = "default";

pub const DEFAULT_POOL_CIDR: &str = "192.168.0.0/16";
pub const DEFAULT_ENCAPSULATION: &str = "IPIP";
pub const DEFAULT_NAT_OUTGOING: &str = "Enabled";
pub const DEFAULT_NODE_SELECTOR: &str = "all()";

pub fn installation_key() -> ArtifactKey {
    ArtifactKey::cluster(Kind::Installation, INSTALLATION_NAME)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Variant {
    Calico,
    TigeraSecureEnterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClusterManagementType {
    #[default]
    Standalone,
    Management,
    Managed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpPool {
    #[serde(default)]
    pub cidr: String,
    #[serde(default)]
    pub encapsulation: String,
    #[serde(default)]
    pub nat_outgoing: String,
    #[serde(default)]
    pub node_selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalicoNetwork {
    #[serde(default)]
    pub ip_pools: Vec<IpPool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// Cluster-wide installation settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,

    /// Image registry prefix; empty means the default registry
    #[serde(default)]
    pub registry: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_provider: Option<Provider>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calico_network: Option<CalicoNetwork>,

    #[serde(default)]
    pub cluster_management_type: ClusterManagementType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<String>,
}

impl InstallationSpec {
    pub fn from_value(value: &Value) -> ControlResult<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| ControlError::invalid("Invalid Installation spec", e.to_string()))
    }

    pub fn provider(&self) -> Provider {
        self.kubernetes_provider.unwrap_or_default()
    }

    pub fn is_management_cluster(&self) -> bool {
        self.cluster_management_type == ClusterManagementType::Management
    }

    /// Full image reference under the configured registry
    pub fn image(&self, name: &str) -> String {
        format!("{}{}", self.registry, name)
    }
}

/// Pod network discovered from the platform (OpenShift cluster network)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlatformNetwork {
    pub cluster_cidrs: Vec<String>,
}

/// Fill unset fields of an installation spec in place
pub fn fill_defaults(spec: &mut InstallationSpec) -> ControlResult<()> {
    spec.variant.get_or_insert(Variant::Calico);

    if !spec.registry.is_empty() && !spec.registry.ends_with('/') {
        spec.registry.push('/');
    }

    if spec.provider().manages_pod_network() {
        if spec.calico_network.is_some() {
            return Err(ControlError::invalid(
                "Invalid Installation spec",
                "Installation spec.calicoNetwork is not supported on EKS",
            ));
        }
        return Ok(());
    }

    let network = spec.calico_network.get_or_insert_with(CalicoNetwork::default);
    if network.ip_pools.is_empty() {
        network.ip_pools.push(IpPool::default());
    }
    for pool in &mut network.ip_pools {
        fill_pool(pool);
    }
    Ok(())
}

/// Merge the platform-discovered network into `spec`, then fill defaults.
///
/// User-supplied pools always win. The platform CIDR is used only when no
/// pool was supplied.
pub fn merge_and_fill_defaults(
    spec: &mut InstallationSpec,
    platform: Option<&PlatformNetwork>,
) -> ControlResult<()> {
    if let Some(platform) = platform.filter(|p| !p.cluster_cidrs.is_empty()) {
        let network = spec.calico_network.get_or_insert_with(CalicoNetwork::default);

        if network.ip_pools.is_empty() {
            network.ip_pools.push(IpPool {
                cidr: platform.cluster_cidrs[0].clone(),
                ..IpPool::default()
            });
        } else {
            for pool in &network.ip_pools {
                if !pool.cidr.is_empty() && !platform.cluster_cidrs.contains(&pool.cidr) {
                    warn!(
                        pool_cidr = %pool.cidr,
                        platform_cidrs = ?platform.cluster_cidrs,
                        "IP pool CIDR differs from the platform cluster network; using the pool CIDR"
                    );
                }
            }
        }
    }

    fill_defaults(spec)
}

fn fill_pool(pool: &mut IpPool) {
    if pool.cidr.is_empty() {
        pool.cidr = DEFAULT_POOL_CIDR.to_string();
    }
    if pool.encapsulation.is_empty() {
        pool.encapsulation = DEFAULT_ENCAPSULATION.to_string();
    }
    if pool.nat_outgoing.is_empty() {
        pool.nat_outgoing = DEFAULT_NAT_OUTGOING.to_string();
    }
    if pool.node_selector.is_empty() {
        pool.node_selector = DEFAULT_NODE_SELECTOR.to_string();
    }
}

/// Read the installation record and fill its defaults.
///
/// The configured provider applies when the record names none; a record
/// naming a different provider than the configured one is rejected.
pub async fn load_installation(
    store: &dyn Store,
    provider: Provider,
    platform: Option<&PlatformNetwork>,
) -> ControlResult<Option<InstallationSpec>> {
    let Some(artifact) = store.get(&installation_key()).await? else {
        return Ok(None);
    };
    let record = ConfigRecord::new(artifact);
    let mut spec = InstallationSpec::from_value(record.spec())?;

    match spec.kubernetes_provider {
        None => spec.kubernetes_provider = Some(provider),
        Some(declared) if provider != Provider::None && declared != provider => {
            return Err(ControlError::invalid(
                "Invalid Installation spec",
                format!(
                    "Installation spec.kubernetesProvider '{}' does not match configured value '{}'",
                    declared, provider
                ),
            ));
        }
        Some(_) => {}
    }

    if spec.provider().is_openshift() {
        merge_and_fill_defaults(&mut spec, platform)?;
    } else {
        fill_defaults(&mut spec)?;
    }
    Ok(Some(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_store::InMemoryStore;
    use halyard_types::Artifact;
    use serde_json::json;

    #[test]
    fn test_fill_defaults_on_empty_spec() {
        let mut spec = InstallationSpec::default();
        fill_defaults(&mut spec).unwrap();

        assert_eq!(spec.variant, Some(Variant::Calico));
        assert!(spec.registry.is_empty());
        let pools = &spec.calico_network.as_ref().unwrap().ip_pools;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].cidr, DEFAULT_POOL_CIDR);
        assert_eq!(pools[0].encapsulation, "IPIP");
        assert_eq!(pools[0].nat_outgoing, "Enabled");
        assert_eq!(pools[0].node_selector, "all()");
    }

    #[test]
    fn test_fill_defaults_keeps_enterprise_variant() {
        let mut spec = InstallationSpec {
            variant: Some(Variant::TigeraSecureEnterprise),
            ..Default::default()
        };
        fill_defaults(&mut spec).unwrap();
        assert_eq!(spec.variant, Some(Variant::TigeraSecureEnterprise));
    }

    #[test]
    fn test_custom_network_rejected_on_eks() {
        let mut spec = InstallationSpec {
            kubernetes_provider: Some(Provider::Eks),
            calico_network: Some(CalicoNetwork::default()),
            ..Default::default()
        };
        assert!(fill_defaults(&mut spec).is_err());
    }

    #[test]
    fn test_custom_configuration_not_overridden() {
        let original = InstallationSpec {
            variant: Some(Variant::TigeraSecureEnterprise),
            registry: "test-reg/".into(),
            calico_network: Some(CalicoNetwork {
                ip_pools: vec![IpPool {
                    cidr: "1.2.3.0/24".into(),
                    encapsulation: "IPIPCrossSubnet".into(),
                    nat_outgoing: "Enabled".into(),
                    node_selector: "has(thiskey)".into(),
                }],
                mtu: Some(1500),
            }),
            image_pull_secrets: vec!["pullSecret1".into(), "pullSecret2".into()],
            ..Default::default()
        };
        let mut spec = original.clone();
        fill_defaults(&mut spec).unwrap();
        assert_eq!(spec, original);
    }

    #[test]
    fn test_registry_gets_trailing_slash() {
        let mut spec = InstallationSpec {
            registry: "test-reg".into(),
            ..Default::default()
        };
        fill_defaults(&mut spec).unwrap();
        assert_eq!(spec.registry, "test-reg/");
        assert_eq!(spec.image("tigera/guardian"), "test-reg/tigera/guardian");
    }

    #[test]
    fn test_platform_cidr_used_when_no_pool_given() {
        let mut spec = InstallationSpec {
            calico_network: Some(CalicoNetwork::default()),
            ..Default::default()
        };
        let platform = PlatformNetwork {
            cluster_cidrs: vec!["10.0.0.0/8".into()],
        };
        merge_and_fill_defaults(&mut spec, Some(&platform)).unwrap();

        let pools = &spec.calico_network.unwrap().ip_pools;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].cidr, "10.0.0.0/8");
        assert_eq!(pools[0].encapsulation, DEFAULT_ENCAPSULATION);
    }

    #[test]
    fn test_user_cidr_wins_over_platform() {
        let mut spec = InstallationSpec {
            calico_network: Some(CalicoNetwork {
                ip_pools: vec![IpPool {
                    cidr: "10.0.0.0/24".into(),
                    ..Default::default()
                }],
                mtu: None,
            }),
            ..Default::default()
        };
        let platform = PlatformNetwork {
            cluster_cidrs: vec!["10.0.0.0/8".into()],
        };
        merge_and_fill_defaults(&mut spec, Some(&platform)).unwrap();

        let pools = &spec.calico_network.unwrap().ip_pools;
        assert_eq!(pools.len(), 1);
        assert_eq!(pools[0].cidr, "10.0.0.0/24");
        assert_eq!(pools[0].node_selector, DEFAULT_NODE_SELECTOR);
    }

    #[test]
    fn test_empty_platform_behaves_like_fill_defaults() {
        let mut merged = InstallationSpec::default();
        merge_and_fill_defaults(&mut merged, Some(&PlatformNetwork::default())).unwrap();
        let mut filled = InstallationSpec::default();
        fill_defaults(&mut filled).unwrap();
        assert_eq!(merged, filled);
    }

    #[tokio::test]
    async fn test_load_installation_applies_configured_provider() {
        let store = InMemoryStore::new();
        assert!(load_installation(&store, Provider::Gke, None).await.unwrap().is_none());

        store
            .seed(Artifact::cluster(
                Kind::Installation,
                INSTALLATION_NAME,
                json!({"spec": {"registry": "quay.io"}}),
            ))
            .await;
        let spec = load_installation(&store, Provider::Gke, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(spec.provider(), Provider::Gke);
        assert_eq!(spec.registry, "quay.io/");
    }

    #[tokio::test]
    async fn test_load_installation_rejects_provider_mismatch() {
        let store = InMemoryStore::new();
        store
            .seed(Artifact::cluster(
                Kind::Installation,
                INSTALLATION_NAME,
                json!({"spec": {"kubernetesProvider": "EKS"}}),
            ))
            .await;
        let err = load_installation(&store, Provider::Aks, None).await.unwrap_err();
        assert!(matches!(err, ControlError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_load_installation_merges_openshift_network() {
        let store = InMemoryStore::new();
        store
            .seed(Artifact::cluster(Kind::Installation, INSTALLATION_NAME, json!({"spec": {}})))
            .await;
        let platform = PlatformNetwork {
            cluster_cidrs: vec!["10.128.0.0/14".into()],
        };
        let spec = load_installation(&store, Provider::OpenShift, Some(&platform))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(spec.calico_network.unwrap().ip_pools[0].cidr, "10.128.0.0/14");
    }
}
