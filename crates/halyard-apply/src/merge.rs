//! Per-kind merge policies

use halyard_types::Kind;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Equality and merge semantics for one artifact kind
pub trait MergePolicy: Send + Sync {
    /// Compute the payload to write given the live payload, the desired
    /// payload and the payload last applied by the engine.
    fn merge(&self, live: &Value, desired: &Value, last_applied: Option<&Value>) -> Value;

    /// Whether a merged payload is equivalent to the live one
    fn equivalent(&self, live: &Value, merged: &Value) -> bool {
        live == merged
    }

    fn name(&self) -> &str;
}

/// Three-way merge: desired fields win, fields dropped since the last apply
/// are removed, fields only other actors wrote are preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeWayMerge;

impl ThreeWayMerge {
    fn merge_value(live: &Value, desired: &Value, last_applied: Option<&Value>) -> Value {
        match (live, desired) {
            (Value::Object(live), Value::Object(desired)) => {
                let last = last_applied.and_then(Value::as_object);
                Value::Object(Self::merge_object(live, desired, last))
            }
            _ => desired.clone(),
        }
    }

    fn merge_object(
        live: &Map<String, Value>,
        desired: &Map<String, Value>,
        last_applied: Option<&Map<String, Value>>,
    ) -> Map<String, Value> {
        let mut out = live.clone();

        if let Some(last) = last_applied {
            for key in last.keys() {
                if !desired.contains_key(key) {
                    out.remove(key);
                }
            }
        }

        for (key, want) in desired {
            let merged = match live.get(key) {
                Some(have) => {
                    Self::merge_value(have, want, last_applied.and_then(|l| l.get(key)))
                }
                None => want.clone(),
            };
            out.insert(key.clone(), merged);
        }

        out
    }
}

impl MergePolicy for ThreeWayMerge {
    fn merge(&self, live: &Value, desired: &Value, last_applied: Option<&Value>) -> Value {
        Self::merge_value(live, desired, last_applied)
    }

    fn name(&self) -> &str {
        "three-way"
    }
}

/// Desired payload replaces the live one wholesale.
///
/// Used for data-carrying kinds where a stale key is worse than a lost one.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplaceMerge;

impl MergePolicy for ReplaceMerge {
    fn merge(&self, _live: &Value, desired: &Value, _last_applied: Option<&Value>) -> Value {
        desired.clone()
    }

    fn name(&self) -> &str {
        "replace"
    }
}

/// Maps kinds to merge policies, falling back to a default
#[derive(Clone)]
pub struct MergeRegistry {
    policies: HashMap<Kind, Arc<dyn MergePolicy>>,
    fallback: Arc<dyn MergePolicy>,
}

impl Default for MergeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl MergeRegistry {
    /// Three-way merge for everything
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
            fallback: Arc::new(ThreeWayMerge),
        }
    }

    /// Three-way merge, with secrets and config maps replaced wholesale
    pub fn standard() -> Self {
        Self::new()
            .with_policy(Kind::Secret, Arc::new(ReplaceMerge))
            .with_policy(Kind::ConfigMap, Arc::new(ReplaceMerge))
    }

    pub fn with_policy(mut self, kind: Kind, policy: Arc<dyn MergePolicy>) -> Self {
        self.policies.insert(kind, policy);
        self
    }

    pub fn policy(&self, kind: Kind) -> &dyn MergePolicy {
        self.policies
            .get(&kind)
            .map(|p| p.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}
