//! Identities for artifacts and subsystems
//!
//! Artifact identity is exact-match on `(kind, namespace, name)`. Subsystems
//! form a closed set; the dependency edges between them are static.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Discriminator for every artifact kind the orchestrator reads or writes.
///
/// Kind-specific marshaling lives behind the store boundary; the core only
/// uses the kind to select a merge policy and to address artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    // Cluster plumbing
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    ConfigMap,
    Secret,
    Service,
    Deployment,
    DaemonSet,
    StorageCluster,

    // Configuration records
    Installation,
    ApiServer,
    LicenseKey,
    ManagementClusterConnection,
    LogStorage,
    LogCollector,
    Manager,
}

impl Kind {
    /// Whether artifacts of this kind live inside a namespace.
    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            Kind::Namespace
                | Kind::ClusterRole
                | Kind::ClusterRoleBinding
                | Kind::Installation
                | Kind::ApiServer
                | Kind::LicenseKey
                | Kind::ManagementClusterConnection
                | Kind::LogStorage
                | Kind::LogCollector
                | Kind::Manager
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Namespace => "Namespace",
            Kind::ServiceAccount => "ServiceAccount",
            Kind::ClusterRole => "ClusterRole",
            Kind::ClusterRoleBinding => "ClusterRoleBinding",
            Kind::ConfigMap => "ConfigMap",
            Kind::Secret => "Secret",
            Kind::Service => "Service",
            Kind::Deployment => "Deployment",
            Kind::DaemonSet => "DaemonSet",
            Kind::StorageCluster => "StorageCluster",
            Kind::Installation => "Installation",
            Kind::ApiServer => "APIServer",
            Kind::LicenseKey => "LicenseKey",
            Kind::ManagementClusterConnection => "ManagementClusterConnection",
            Kind::LogStorage => "LogStorage",
            Kind::LogCollector => "LogCollector",
            Kind::Manager => "Manager",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match identity of an artifact in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ArtifactKey {
    /// Key for a namespaced artifact
    pub fn namespaced(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped artifact
    pub fn cluster(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: None,
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Non-owning back-link from an artifact to the record that caused it.
///
/// Used for identification only. Deleting the record is never blocked by
/// artifacts that reference it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: Kind,
    pub name: String,
    pub uid: Uuid,
}

/// The orchestrated subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubsystemId {
    /// Connectivity gateway from a managed cluster to its management cluster
    ClusterConnection,
    /// Log storage cluster
    LogStorage,
    /// Log collection agents
    LogCollector,
    /// Management UI
    Manager,
}

impl SubsystemId {
    pub const ALL: [SubsystemId; 4] = [
        SubsystemId::ClusterConnection,
        SubsystemId::LogStorage,
        SubsystemId::LogCollector,
        SubsystemId::Manager,
    ];

    /// Kind of the configuration record this subsystem is driven by
    pub fn record_kind(&self) -> Kind {
        match self {
            SubsystemId::ClusterConnection => Kind::ManagementClusterConnection,
            SubsystemId::LogStorage => Kind::LogStorage,
            SubsystemId::LogCollector => Kind::LogCollector,
            SubsystemId::Manager => Kind::Manager,
        }
    }

    /// Key of the singleton configuration record for this subsystem
    pub fn record_key(&self) -> ArtifactKey {
        ArtifactKey::cluster(self.record_kind(), crate::record::DEFAULT_RECORD_NAME)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemId::ClusterConnection => "cluster-connection",
            SubsystemId::LogStorage => "log-storage",
            SubsystemId::LogCollector => "log-collector",
            SubsystemId::Manager => "manager",
        }
    }
}

impl fmt::Display for SubsystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown subsystem: {0}")]
pub struct UnknownSubsystem(pub String);

impl FromStr for SubsystemId {
    type Err = UnknownSubsystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "cluster-connection" | "clusterconnection" | "guardian" => {
                Ok(SubsystemId::ClusterConnection)
            }
            "log-storage" | "logstorage" => Ok(SubsystemId::LogStorage),
            "log-collector" | "logcollector" => Ok(SubsystemId::LogCollector),
            "manager" => Ok(SubsystemId::Manager),
            _ => Err(UnknownSubsystem(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let ns = ArtifactKey::cluster(Kind::Namespace, "tigera-guardian");
        assert_eq!(ns.to_string(), "Namespace/tigera-guardian");

        let sa = ArtifactKey::namespaced(Kind::ServiceAccount, "tigera-guardian", "guardian");
        assert_eq!(sa.to_string(), "ServiceAccount/tigera-guardian/guardian");
    }

    #[test]
    fn test_key_identity_is_exact() {
        let a = ArtifactKey::namespaced(Kind::Secret, "a", "x");
        let b = ArtifactKey::namespaced(Kind::Secret, "b", "x");
        let c = ArtifactKey::namespaced(Kind::ConfigMap, "a", "x");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, ArtifactKey::namespaced(Kind::Secret, "a", "x"));
    }

    #[test]
    fn test_subsystem_parse() {
        assert_eq!(
            "log_collector".parse::<SubsystemId>().unwrap(),
            SubsystemId::LogCollector
        );
        assert_eq!(
            "guardian".parse::<SubsystemId>().unwrap(),
            SubsystemId::ClusterConnection
        );
        assert!("compliance".parse::<SubsystemId>().is_err());
    }

    #[test]
    fn test_record_keys_are_cluster_scoped() {
        for id in SubsystemId::ALL {
            let key = id.record_key();
            assert!(key.namespace.is_none());
            assert!(!key.kind.is_namespaced());
        }
    }
}
