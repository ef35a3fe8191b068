//! Configuration records and their persisted status
//!
//! A configuration record is an ordinary artifact whose payload carries a
//! `spec` and whose `status` carries the subsystem's [`SubsystemStatus`].
//! Status is the only place reconcile state is persisted, so a restarted
//! process rebuilds everything it needs from the store.

use crate::artifact::Artifact;
use crate::ids::{ArtifactKey, OwnerReference};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Name of the singleton record for every subsystem.
pub const DEFAULT_RECORD_NAME: &str = "tigera-secure";

/// Human-readable state persisted into a record's status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusState {
    /// No error and nothing to report
    #[default]
    #[serde(rename = "")]
    Empty,
    Degraded,
    Progressing,
    Ready,
}

/// Status sub-record written back after each pass
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemStatus {
    #[serde(default)]
    pub state: StatusState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Record version the status was computed from
    #[serde(default)]
    pub observed_version: u64,
}

impl SubsystemStatus {
    pub fn ready(observed_version: u64) -> Self {
        Self {
            state: StatusState::Ready,
            reason: None,
            detail: None,
            observed_version,
        }
    }

    pub fn degraded(reason: impl Into<String>, detail: impl Into<String>, observed_version: u64) -> Self {
        let detail = detail.into();
        Self {
            state: StatusState::Degraded,
            reason: Some(reason.into()),
            detail: (!detail.is_empty()).then_some(detail),
            observed_version,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == StatusState::Ready
    }

    /// Parse from an artifact's status field; malformed status reads as empty
    pub fn from_value(value: &Value) -> Self {
        if value.is_null() {
            return Self::default();
        }
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Equality ignoring the observed version
    pub fn same_condition(&self, other: &SubsystemStatus) -> bool {
        self.state == other.state && self.reason == other.reason && self.detail == other.detail
    }
}

/// Typed view over a configuration record artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRecord {
    artifact: Artifact,
}

impl ConfigRecord {
    pub fn new(artifact: Artifact) -> Self {
        Self { artifact }
    }

    pub fn key(&self) -> &ArtifactKey {
        &self.artifact.key
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn into_artifact(self) -> Artifact {
        self.artifact
    }

    pub fn version(&self) -> u64 {
        self.artifact.version
    }

    /// The user-supplied spec; records without a `spec` wrapper use the payload
    pub fn spec(&self) -> &Value {
        self.artifact.payload.get("spec").unwrap_or(&self.artifact.payload)
    }

    pub fn spec_str(&self, path: &str) -> Option<&str> {
        self.spec_field(path).and_then(Value::as_str)
    }

    pub fn spec_field(&self, path: &str) -> Option<&Value> {
        self.spec()
            .pointer(&format!("/{}", path.trim_start_matches('/')))
    }

    /// Records are enabled unless `spec.enabled` is explicitly `false`
    pub fn is_enabled(&self) -> bool {
        self.spec()
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.artifact.deletion_requested
    }

    pub fn status(&self) -> SubsystemStatus {
        SubsystemStatus::from_value(&self.artifact.status)
    }

    /// Back-reference stamped on every artifact rendered from this record
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            kind: self.artifact.key.kind,
            name: self.artifact.key.name.clone(),
            uid: self.artifact.uid.unwrap_or(Uuid::nil()),
        }
    }
}

impl From<Artifact> for ConfigRecord {
    fn from(artifact: Artifact) -> Self {
        Self::new(artifact)
    }
}
