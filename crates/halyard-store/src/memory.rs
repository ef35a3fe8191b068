//! In-memory store implementation

use super::traits::Store;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use halyard_types::{Artifact, ArtifactKey};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Store operation recorded in the call journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    Delete,
}

impl StoreOp {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreOp::Get)
    }
}

/// One entry in the call journal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub key: ArtifactKey,
}

/// What happened to an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Broadcast after every committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: ArtifactKey,
    pub change: ChangeKind,
}

/// Failure injected into the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Unavailable,
    Invalid,
}

/// In-memory store for development and testing
#[derive(Debug)]
pub struct InMemoryStore {
    objects: Arc<RwLock<HashMap<ArtifactKey, Artifact>>>,
    version: Arc<AtomicU64>,
    calls: Mutex<Vec<StoreCall>>,
    pending_conflicts: Mutex<HashMap<ArtifactKey, u32>>,
    pending_faults: Mutex<HashMap<(StoreOp, ArtifactKey), Fault>>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            version: Arc::new(AtomicU64::new(0)),
            calls: Mutex::new(Vec::new()),
            pending_conflicts: Mutex::new(HashMap::new()),
            pending_faults: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to committed writes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    /// Insert or replace an artifact without journaling the call.
    ///
    /// Used to seed state and to simulate writes by other actors.
    pub async fn seed(&self, mut artifact: Artifact) -> Artifact {
        let mut objects = self.objects.write().await;
        let change = match objects.get(&artifact.key) {
            Some(existing) => {
                artifact.uid = existing.uid;
                ChangeKind::Updated
            }
            None => {
                artifact.uid.get_or_insert_with(Uuid::new_v4);
                ChangeKind::Created
            }
        };
        artifact.version = self.next_version();
        objects.insert(artifact.key.clone(), artifact.clone());
        drop(objects);
        self.emit(&artifact.key, change);
        artifact
    }

    /// Mark an artifact for deletion, the way a user deletes a record
    /// guarded by a finalizer. Returns false if the artifact is absent.
    pub async fn request_deletion(&self, key: &ArtifactKey) -> bool {
        let mut objects = self.objects.write().await;
        let Some(artifact) = objects.get_mut(key) else {
            return false;
        };
        artifact.deletion_requested = true;
        artifact.version = self.next_version();
        drop(objects);
        self.emit(key, ChangeKind::Updated);
        true
    }

    /// Read an artifact without journaling the call
    pub async fn peek(&self, key: &ArtifactKey) -> Option<Artifact> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Every journaled call, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Journaled writes (create/update/delete), in order
    pub fn writes(&self) -> Vec<StoreCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op.is_write())
            .cloned()
            .collect()
    }

    /// Journaled calls of one operation, in order
    pub fn calls_of(&self, op: StoreOp) -> Vec<ArtifactKey> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.key.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Make the next `count` updates of `key` fail with a version conflict
    pub fn inject_conflicts(&self, key: &ArtifactKey, count: u32) {
        lock(&self.pending_conflicts).insert(key.clone(), count);
    }

    /// Make the next `op` on `key` fail with `fault`
    pub fn inject_failure(&self, op: StoreOp, key: &ArtifactKey, fault: Fault) {
        lock(&self.pending_faults).insert((op, key.clone()), fault);
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn record(&self, op: StoreOp, key: &ArtifactKey) -> StoreResult<()> {
        lock(&self.calls).push(StoreCall {
            op,
            key: key.clone(),
        });

        match lock(&self.pending_faults).remove(&(op, key.clone())) {
            Some(Fault::Unavailable) => Err(StoreError::Unavailable(format!(
                "injected failure on {:?} {}",
                op, key
            ))),
            Some(Fault::Invalid) => Err(StoreError::Invalid {
                key: key.clone(),
                reason: "injected invalid payload".to_string(),
            }),
            None => Ok(()),
        }
    }

    fn take_conflict(&self, key: &ArtifactKey) -> bool {
        let mut conflicts = lock(&self.pending_conflicts);
        match conflicts.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                if *remaining == 0 {
                    conflicts.remove(key);
                }
                true
            }
            _ => false,
        }
    }

    fn emit(&self, key: &ArtifactKey, change: ChangeKind) {
        // No subscribers is fine
        let _ = self.event_tx.send(StoreEvent {
            key: key.clone(),
            change,
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, key: &ArtifactKey) -> StoreResult<Option<Artifact>> {
        self.record(StoreOp::Get, key)?;
        let objects = self.objects.read().await;
        Ok(objects.get(key).cloned())
    }

    async fn create(&self, mut artifact: Artifact) -> StoreResult<Artifact> {
        self.record(StoreOp::Create, &artifact.key)?;
        if artifact.key.kind.is_namespaced() != artifact.key.namespace.is_some() {
            return Err(StoreError::Invalid {
                key: artifact.key.clone(),
                reason: "namespace does not match kind scope".to_string(),
            });
        }

        let mut objects = self.objects.write().await;
        if objects.contains_key(&artifact.key) {
            return Err(StoreError::AlreadyExists(artifact.key.clone()));
        }

        artifact.version = self.next_version();
        artifact.uid = Some(Uuid::new_v4());
        objects.insert(artifact.key.clone(), artifact.clone());
        drop(objects);

        tracing::trace!(key = %artifact.key, version = artifact.version, "Created artifact");
        self.emit(&artifact.key, ChangeKind::Created);
        Ok(artifact)
    }

    async fn update(&self, mut artifact: Artifact, expected_version: u64) -> StoreResult<Artifact> {
        self.record(StoreOp::Update, &artifact.key)?;

        let mut objects = self.objects.write().await;
        let Some(existing) = objects.get(&artifact.key) else {
            return Err(StoreError::NotFound(artifact.key.clone()));
        };

        if self.take_conflict(&artifact.key) || existing.version != expected_version {
            return Err(StoreError::Conflict {
                key: artifact.key.clone(),
                expected: expected_version,
                actual: existing.version,
            });
        }

        artifact.uid = existing.uid;
        artifact.version = self.next_version();
        objects.insert(artifact.key.clone(), artifact.clone());
        drop(objects);

        tracing::trace!(key = %artifact.key, version = artifact.version, "Updated artifact");
        self.emit(&artifact.key, ChangeKind::Updated);
        Ok(artifact)
    }

    async fn delete(&self, key: &ArtifactKey) -> StoreResult<()> {
        self.record(StoreOp::Delete, key)?;

        let mut objects = self.objects.write().await;
        if objects.remove(key).is_none() {
            return Err(StoreError::NotFound(key.clone()));
        }
        drop(objects);

        tracing::trace!(key = %key, "Deleted artifact");
        self.emit(key, ChangeKind::Deleted);
        Ok(())
    }
}
