//! Artifacts: identity plus opaque payload
//!
//! The payload is the part of an artifact the engine controls. `status` is
//! written by other actors and is never touched when applying.

use crate::ids::{ArtifactKey, Kind, OwnerReference};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Annotation holding the payload most recently applied by the engine.
pub const LAST_APPLIED_ANNOTATION: &str = "halyard.io/last-applied";

/// A single object in the live store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub key: ArtifactKey,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerReference>,

    /// Engine-controlled content
    #[serde(default)]
    pub payload: Value,

    /// Content written by other actors
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub status: Value,

    /// Store-assigned version used for optimistic concurrency; 0 until stored
    #[serde(default)]
    pub version: u64,

    /// Store-assigned identity, stable across updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<Uuid>,

    /// Set when deletion of this artifact has been requested but its
    /// finalization has not run yet
    #[serde(default)]
    pub deletion_requested: bool,
}

impl Artifact {
    pub fn new(key: ArtifactKey, payload: Value) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner: None,
            payload,
            status: Value::Null,
            version: 0,
            uid: None,
            deletion_requested: false,
        }
    }

    pub fn namespaced(kind: Kind, namespace: &str, name: &str, payload: Value) -> Self {
        Self::new(ArtifactKey::namespaced(kind, namespace, name), payload)
    }

    pub fn cluster(kind: Kind, name: &str, payload: Value) -> Self {
        Self::new(ArtifactKey::cluster(kind, name), payload)
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = status;
        self
    }

    pub fn kind(&self) -> Kind {
        self.key.kind
    }

    /// The payload most recently applied by the engine, if recorded
    pub fn last_applied(&self) -> Option<Value> {
        self.annotations
            .get(LAST_APPLIED_ANNOTATION)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn set_last_applied(&mut self, payload: &Value) {
        self.annotations
            .insert(LAST_APPLIED_ANNOTATION.to_string(), payload.to_string());
    }

    /// Look up a nested payload field by a `/`-separated path
    pub fn payload_field(&self, path: &str) -> Option<&Value> {
        self.payload.pointer(&format!("/{}", path.trim_start_matches('/')))
    }

    /// Look up a string entry in a `data` map payload (secrets, config maps)
    pub fn data_entry(&self, field: &str) -> Option<&str> {
        self.payload
            .get("data")
            .and_then(|d| d.get(field))
            .and_then(Value::as_str)
    }
}
