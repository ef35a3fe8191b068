//! Apply engine and teardown sequencer

use crate::context::PassContext;
use crate::error::{ApplyError, ApplyResult};
use crate::merge::MergeRegistry;
use halyard_store::{Store, StoreError};
use halyard_types::{Artifact, ArtifactKey, LAST_APPLIED_ANNOTATION};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// One initial attempt plus one retry after a fresh read
const MAX_ATTEMPTS: u32 = 2;

/// What `reconcile` did to each artifact
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: Vec<ArtifactKey>,
    pub updated: Vec<ArtifactKey>,
    pub unchanged: Vec<ArtifactKey>,
}

impl ApplyReport {
    /// Number of writes issued
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    pub fn is_noop(&self) -> bool {
        self.writes() == 0
    }

    fn merge(&mut self, other: ApplyReport) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.unchanged.extend(other.unchanged);
    }
}

/// What `teardown` did to each identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub deleted: Vec<ArtifactKey>,
    pub absent: Vec<ArtifactKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Created,
    Updated,
    Unchanged,
}

/// Idempotent create-or-update of ordered artifact sequences
pub struct ApplyEngine {
    store: Arc<dyn Store>,
    policies: MergeRegistry,
}

impl ApplyEngine {
    /// Create an engine with the standard merge policies
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_policies(store, MergeRegistry::standard())
    }

    pub fn with_policies(store: Arc<dyn Store>, policies: MergeRegistry) -> Self {
        Self { store, policies }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Make the live store match `desired`, in order.
    ///
    /// Identities are checked for duplicates before anything is written.
    #[instrument(parent = ctx.span(), skip_all, fields(artifacts = desired.len()))]
    pub async fn reconcile(
        &self,
        ctx: &PassContext,
        desired: &[Artifact],
    ) -> ApplyResult<ApplyReport> {
        check_unique(desired.iter().map(|a| &a.key))?;

        let mut report = ApplyReport::default();
        for artifact in desired {
            match self.apply_one(artifact).await? {
                Applied::Created => report.created.push(artifact.key.clone()),
                Applied::Updated => report.updated.push(artifact.key.clone()),
                Applied::Unchanged => report.unchanged.push(artifact.key.clone()),
            }
        }

        if !report.is_noop() {
            info!(
                created = report.created.len(),
                updated = report.updated.len(),
                pass_id = %ctx.pass_id,
                "Applied artifacts"
            );
        }
        Ok(report)
    }

    /// Apply several components as one sequence, preserving component order
    pub async fn reconcile_all<I>(&self, ctx: &PassContext, components: I) -> ApplyResult<ApplyReport>
    where
        I: IntoIterator<Item = Vec<Artifact>>,
    {
        let batches: Vec<Vec<Artifact>> = components.into_iter().collect();
        check_unique(batches.iter().flatten().map(|a| &a.key))?;

        let mut report = ApplyReport::default();
        for batch in &batches {
            report.merge(self.reconcile(ctx, batch).await?);
        }
        Ok(report)
    }

    /// Delete `identities` in reverse order; absent artifacts count as deleted
    #[instrument(parent = ctx.span(), skip_all, fields(artifacts = identities.len()))]
    pub async fn teardown(
        &self,
        ctx: &PassContext,
        identities: &[ArtifactKey],
    ) -> ApplyResult<TeardownReport> {
        let mut report = TeardownReport::default();
        for key in identities.iter().rev() {
            match self.store.delete(key).await {
                Ok(()) => {
                    debug!(key = %key, "Deleted artifact");
                    report.deleted.push(key.clone());
                }
                Err(StoreError::NotFound(_)) => report.absent.push(key.clone()),
                Err(e) => {
                    warn!(key = %key, error = %e, "Teardown stopped");
                    return Err(ApplyError::store(key, e));
                }
            }
        }

        if !report.deleted.is_empty() {
            info!(deleted = report.deleted.len(), pass_id = %ctx.pass_id, "Tore down artifacts");
        }
        Ok(report)
    }

    async fn apply_one(&self, desired: &Artifact) -> ApplyResult<Applied> {
        let key = &desired.key;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let live = self
                .store
                .get(key)
                .await
                .map_err(|e| ApplyError::store(key, e))?;

            let outcome = match live {
                None => self.create(desired).await,
                Some(live) => match self.prepare_update(&live, desired) {
                    None => return Ok(Applied::Unchanged),
                    Some(next) => match self.store.update(next, live.version).await {
                        Ok(_) => Ok(Applied::Updated),
                        // Deleted between read and write
                        Err(StoreError::NotFound(_)) => self.create(desired).await,
                        Err(e) => Err(e),
                    },
                },
            };

            match outcome {
                Ok(applied) => return Ok(applied),
                Err(e) if e.is_conflict() => {
                    if attempt >= MAX_ATTEMPTS {
                        warn!(key = %key, "Conflict persisted after fresh read");
                        return Err(ApplyError::ConflictExhausted(key.clone()));
                    }
                    debug!(key = %key, error = %e, "Conflict, retrying with fresh read");
                }
                Err(e) => return Err(ApplyError::store(key, e)),
            }
        }
    }

    async fn create(&self, desired: &Artifact) -> Result<Applied, StoreError> {
        let mut fresh = desired.clone();
        fresh.version = 0;
        fresh.uid = None;
        fresh.deletion_requested = false;
        fresh.set_last_applied(&desired.payload);
        self.store.create(fresh).await.map(|_| Applied::Created)
    }

    /// Build the update for `live`, or `None` if it already matches
    fn prepare_update(&self, live: &Artifact, desired: &Artifact) -> Option<Artifact> {
        let policy = self.policies.policy(desired.kind());
        let last_applied = live.last_applied();
        let payload = policy.merge(&live.payload, &desired.payload, last_applied.as_ref());

        let mut labels = live.labels.clone();
        labels.extend(desired.labels.clone());

        let mut annotations = live.annotations.clone();
        annotations.extend(desired.annotations.clone());

        let owner = desired.owner.clone().or_else(|| live.owner.clone());

        let mut next = live.clone();
        next.labels = labels;
        next.annotations = annotations;
        next.owner = owner;
        next.payload = payload;
        next.set_last_applied(&desired.payload);

        // Artifacts created elsewhere get the annotation on their first
        // real change, not just to record it.
        let last_applied_current = last_applied
            .as_ref()
            .map_or(true, |recorded| recorded == &desired.payload);

        let unchanged = policy.equivalent(&live.payload, &next.payload)
            && live.labels == next.labels
            && without_last_applied(&live.annotations) == without_last_applied(&next.annotations)
            && live.owner == next.owner
            && last_applied_current;

        if unchanged {
            None
        } else {
            Some(next)
        }
    }
}

fn without_last_applied(annotations: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
    annotations
        .iter()
        .filter(|(k, _)| k.as_str() != LAST_APPLIED_ANNOTATION)
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect()
}

fn check_unique<'a>(keys: impl Iterator<Item = &'a ArtifactKey>) -> ApplyResult<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(ApplyError::DuplicateIdentity(key.clone()));
        }
    }
    Ok(())
}
