//! Store trait definitions

use crate::error::StoreResult;
use async_trait::async_trait;
use halyard_types::{Artifact, ArtifactKey, ConfigRecord, SubsystemId};

/// Identity-addressed artifact store with optimistic concurrency
#[async_trait]
pub trait Store: Send + Sync {
    /// Get an artifact by identity
    async fn get(&self, key: &ArtifactKey) -> StoreResult<Option<Artifact>>;

    /// Create an artifact; fails with `AlreadyExists` if present
    async fn create(&self, artifact: Artifact) -> StoreResult<Artifact>;

    /// Replace an artifact if its stored version equals `expected_version`
    async fn update(&self, artifact: Artifact, expected_version: u64) -> StoreResult<Artifact>;

    /// Delete an artifact; fails with `NotFound` if absent
    async fn delete(&self, key: &ArtifactKey) -> StoreResult<()>;
}

/// Convenience lookups layered on top of [`Store`]
#[async_trait]
pub trait StoreExt: Store {
    /// Fetch the configuration record of a subsystem
    async fn get_record(&self, subsystem: SubsystemId) -> StoreResult<Option<ConfigRecord>> {
        Ok(self.get(&subsystem.record_key()).await?.map(ConfigRecord::new))
    }
}

impl<T: Store + ?Sized> StoreExt for T {}
