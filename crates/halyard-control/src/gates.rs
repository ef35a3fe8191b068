//! Preflight gates evaluated before any subsystem is rendered

use crate::error::ControlResult;
use crate::installation::installation_key;
use chrono::{DateTime, Utc};
use halyard_status::WaitReason;
use halyard_store::Store;
use halyard_types::{ArtifactKey, ConfigRecord, Kind, DEFAULT_RECORD_NAME};
use std::fmt;

/// Name of the singleton license key record
pub const LICENSE_KEY_NAME: &str = "default";

/// Cluster-wide precondition a subsystem may require
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preflight {
    /// The aggregated API server reports ready
    ApiServer,
    /// A license key exists and has not expired
    License,
    /// The installation record exists
    Installation,
}

impl Preflight {
    pub const ALL: &'static [Preflight] =
        &[Preflight::ApiServer, Preflight::License, Preflight::Installation];

    /// Record whose changes can flip this gate
    pub fn watched_key(&self) -> ArtifactKey {
        match self {
            Preflight::ApiServer => ArtifactKey::cluster(Kind::ApiServer, DEFAULT_RECORD_NAME),
            Preflight::License => ArtifactKey::cluster(Kind::LicenseKey, LICENSE_KEY_NAME),
            Preflight::Installation => installation_key(),
        }
    }

    /// Check the gate; `Some` describes why the pass has to wait
    pub async fn check(&self, store: &dyn Store) -> ControlResult<Option<GateFailure>> {
        let record = store.get(&self.watched_key()).await?.map(ConfigRecord::new);
        Ok(match self {
            Preflight::ApiServer => check_api_server(record.as_ref()),
            Preflight::License => check_license(record.as_ref(), Utc::now()),
            Preflight::Installation => record
                .is_none()
                .then(|| GateFailure::new("Installation not found", "", WaitReason::Upstream)),
        })
    }
}

impl fmt::Display for Preflight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Preflight::ApiServer => f.write_str("api-server"),
            Preflight::License => f.write_str("license"),
            Preflight::Installation => f.write_str("installation"),
        }
    }
}

/// Why a gate is closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateFailure {
    pub reason: String,
    pub detail: String,
    pub wait: WaitReason,
}

impl GateFailure {
    fn new(reason: &str, detail: impl Into<String>, wait: WaitReason) -> Self {
        Self {
            reason: reason.to_string(),
            detail: detail.into(),
            wait,
        }
    }
}

fn check_api_server(record: Option<&ConfigRecord>) -> Option<GateFailure> {
    match record {
        Some(r) if r.status().is_ready() => None,
        _ => Some(GateFailure::new(
            "Waiting for Tigera API server to be ready",
            "",
            WaitReason::Upstream,
        )),
    }
}

fn check_license(record: Option<&ConfigRecord>, now: DateTime<Utc>) -> Option<GateFailure> {
    let Some(record) = record else {
        return Some(GateFailure::new(
            "License not found",
            "licensekeys.projectcalico.org \"default\" not found",
            WaitReason::License,
        ));
    };

    // A license without an expiry never expires
    let expiry = record.spec_str("expiry")?;
    match DateTime::parse_from_rfc3339(expiry) {
        Ok(expiry) if expiry.with_timezone(&Utc) <= now => Some(GateFailure::new(
            "License expired",
            format!("license expired at {}", expiry),
            WaitReason::License,
        )),
        Ok(_) => None,
        Err(e) => Some(GateFailure::new(
            "Invalid license",
            format!("cannot parse expiry {:?}: {}", expiry, e),
            WaitReason::License,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_store::InMemoryStore;
    use halyard_types::{Artifact, SubsystemStatus};
    use serde_json::json;

    fn license(expiry: Option<&str>) -> ConfigRecord {
        let spec = match expiry {
            Some(e) => json!({"spec": {"expiry": e}}),
            None => json!({"spec": {}}),
        };
        ConfigRecord::new(Artifact::cluster(Kind::LicenseKey, LICENSE_KEY_NAME, spec))
    }

    #[test]
    fn test_license_gate() {
        let now = Utc::now();
        let missing = check_license(None, now).unwrap();
        assert_eq!(missing.reason, "License not found");
        assert_eq!(missing.wait, WaitReason::License);

        assert!(check_license(Some(&license(None)), now).is_none());
        assert!(check_license(Some(&license(Some("2999-01-01T00:00:00Z"))), now).is_none());

        let expired = check_license(Some(&license(Some("2001-01-01T00:00:00Z"))), now).unwrap();
        assert_eq!(expired.reason, "License expired");

        let garbage = check_license(Some(&license(Some("soon"))), now).unwrap();
        assert_eq!(garbage.reason, "Invalid license");
    }

    #[tokio::test]
    async fn test_api_server_gate_reads_status() {
        let store = InMemoryStore::new();
        let gate = Preflight::ApiServer;

        let closed = gate.check(&store).await.unwrap().unwrap();
        assert_eq!(closed.reason, "Waiting for Tigera API server to be ready");
        assert_eq!(closed.wait, WaitReason::Upstream);

        store
            .seed(
                Artifact::cluster(Kind::ApiServer, DEFAULT_RECORD_NAME, json!({"spec": {}}))
                    .with_status(SubsystemStatus::ready(1).to_value()),
            )
            .await;
        assert!(gate.check(&store).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_installation_gate() {
        let store = InMemoryStore::new();
        let closed = Preflight::Installation.check(&store).await.unwrap().unwrap();
        assert_eq!(closed.reason, "Installation not found");

        store
            .seed(Artifact::cluster(Kind::Installation, "default", json!({"spec": {}})))
            .await;
        assert!(Preflight::Installation.check(&store).await.unwrap().is_none());
    }
}
