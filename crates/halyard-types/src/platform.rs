//! Hosting platform providers
//!
//! The provider is supplied by configuration; auto-discovery is not done
//! here. Renderers use it for platform-specific artifact content.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kubernetes distribution hosting the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Provider {
    /// No specific provider
    #[default]
    #[serde(alias = "none", alias = "")]
    None,
    #[serde(rename = "EKS", alias = "eks")]
    Eks,
    #[serde(rename = "GKE", alias = "gke")]
    Gke,
    #[serde(rename = "AKS", alias = "aks")]
    Aks,
    #[serde(alias = "openshift")]
    OpenShift,
    #[serde(rename = "DockerEnterprise", alias = "dockeree")]
    DockerEe,
}

impl Provider {
    /// OpenShift requires run-level labels on namespaces
    pub fn is_openshift(&self) -> bool {
        matches!(self, Provider::OpenShift)
    }

    /// Managed providers reject a user-supplied pod network
    pub fn manages_pod_network(&self) -> bool {
        matches!(self, Provider::Eks)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::None => "none",
            Provider::Eks => "EKS",
            Provider::Gke => "GKE",
            Provider::Aks => "AKS",
            Provider::OpenShift => "OpenShift",
            Provider::DockerEe => "DockerEnterprise",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "" | "none" => Ok(Provider::None),
            "eks" => Ok(Provider::Eks),
            "gke" => Ok(Provider::Gke),
            "aks" => Ok(Provider::Aks),
            "openshift" => Ok(Provider::OpenShift),
            "dockeree" | "dockerenterprise" | "docker-ee" => Ok(Provider::DockerEe),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}
