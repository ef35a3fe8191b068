//! Startup seeding of the object store from a JSON file

use crate::error::{DaemonError, DaemonResult};
use halyard_store::InMemoryStore;
use halyard_types::Artifact;
use std::path::Path;
use tracing::info;

/// Load a JSON array of artifacts into the store; returns how many were loaded
pub async fn seed_from_file(store: &InMemoryStore, path: impl AsRef<Path>) -> DaemonResult<usize> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await?;
    let artifacts: Vec<Artifact> = serde_json::from_str(&raw).map_err(|e| DaemonError::Seed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let count = artifacts.len();
    for artifact in artifacts {
        store.seed(artifact).await;
    }
    info!(path = %path.display(), count, "Seeded object store");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use halyard_types::{ArtifactKey, Kind};

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("halyard-seed-{}-{}.json", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_seed_loads_artifacts() {
        let path = temp_path("ok");
        tokio::fs::write(
            &path,
            r#"[
                {"key": {"kind": "Installation", "name": "default"}, "payload": {"spec": {}}},
                {"key": {"kind": "Secret", "namespace": "tigera-operator", "name": "creds"},
                 "payload": {"data": {"a": "b"}}}
            ]"#,
        )
        .await
        .unwrap();

        let store = InMemoryStore::new();
        let count = seed_from_file(&store, &path).await.unwrap();
        assert_eq!(count, 2);

        let secret = store
            .peek(&ArtifactKey::namespaced(Kind::Secret, "tigera-operator", "creds"))
            .await
            .unwrap();
        assert!(secret.version > 0);
        assert!(secret.uid.is_some());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_malformed_seed_names_the_file() {
        let path = temp_path("bad");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = InMemoryStore::new();
        let err = seed_from_file(&store, &path).await.unwrap_err();
        assert!(matches!(err, DaemonError::Seed { .. }));
        assert!(err.to_string().contains("halyard-seed"));
        assert!(store.is_empty().await);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_missing_seed_file_is_io_error() {
        let store = InMemoryStore::new();
        let err = seed_from_file(&store, temp_path("missing")).await.unwrap_err();
        assert!(matches!(err, DaemonError::Io(_)));
    }
}
