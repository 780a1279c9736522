//! Artifact registry.
//!
//! Every derived file in the storage root has exactly one entry here and every
//! entry names a file that is fully written. Registration and deletion go
//! through one registry-wide async mutex; `delete` removes the entry and the
//! file while holding it, so a sweep can never interleave with a register or
//! another delete of the same name.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use ffbox_models::{Artifact, ArtifactKind};
use tempfile::TempPath;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::root::{is_valid_artifact_name, StorageRoot};

/// Gauge tracking the number of registered artifacts.
pub const REGISTRY_SIZE_GAUGE: &str = "ffbox_registry_artifacts";

/// Outcome of adopting files left behind by a previous process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdoptReport {
    pub adopted: usize,
    pub removed: usize,
}

pub struct ArtifactRegistry {
    root: StorageRoot,
    entries: Mutex<HashMap<String, Artifact>>,
}

impl ArtifactRegistry {
    pub fn new(root: StorageRoot) -> Self {
        Self {
            root,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Record a completely written artifact.
    ///
    /// Must be called before the filename is handed to any client.
    pub async fn register(&self, artifact: Artifact) -> StorageResult<()> {
        if !is_valid_artifact_name(&artifact.filename) {
            return Err(StorageError::invalid_filename(&artifact.filename));
        }

        let mut entries = self.entries.lock().await;
        Self::insert_entry(&mut entries, artifact);
        Ok(())
    }

    /// Record an artifact whose file is still owned by `pending`.
    ///
    /// The file is kept only once the registry lock is held, so dropping this
    /// future early lets `pending` delete it and no unregistered file remains.
    pub async fn register_pending(
        &self,
        artifact: Artifact,
        pending: TempPath,
    ) -> StorageResult<()> {
        if !is_valid_artifact_name(&artifact.filename) {
            return Err(StorageError::invalid_filename(&artifact.filename));
        }

        let mut entries = self.entries.lock().await;
        // On failure the path inside the error is dropped, removing the file
        pending.keep().map_err(|e| StorageError::Io(e.error))?;
        Self::insert_entry(&mut entries, artifact);
        Ok(())
    }

    fn insert_entry(entries: &mut HashMap<String, Artifact>, artifact: Artifact) {
        debug!(
            filename = %artifact.filename,
            kind = artifact.kind.label(),
            size_bytes = artifact.size_bytes,
            "Registering artifact"
        );
        if entries.insert(artifact.filename.clone(), artifact).is_some() {
            warn!("Artifact registered twice; keeping latest entry");
        }
        metrics::gauge!(REGISTRY_SIZE_GAUGE).set(entries.len() as f64);
    }

    /// Fetch an artifact record by name.
    pub async fn lookup(&self, filename: &str) -> StorageResult<Artifact> {
        if !is_valid_artifact_name(filename) {
            return Err(StorageError::invalid_filename(filename));
        }
        self.entries
            .lock()
            .await
            .get(filename)
            .cloned()
            .ok_or_else(|| StorageError::not_found(filename))
    }

    /// Fetch an artifact record together with its on-disk path.
    pub async fn locate(&self, filename: &str) -> StorageResult<(Artifact, PathBuf)> {
        let artifact = self.lookup(filename).await?;
        let path = self.root.resolve(&artifact.filename)?;
        Ok((artifact, path))
    }

    /// Remove an artifact's entry and file.
    ///
    /// Idempotent: deleting an unknown name is a no-op returning `false`. A file
    /// that is already gone is not an error. If the file cannot be removed for
    /// another reason the entry is restored and the error returned.
    pub async fn delete(&self, filename: &str) -> StorageResult<bool> {
        if !is_valid_artifact_name(filename) {
            return Err(StorageError::invalid_filename(filename));
        }

        let mut entries = self.entries.lock().await;
        let Some(artifact) = entries.remove(filename) else {
            return Ok(false);
        };

        let path = self.root.path().join(filename);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(filename, "Artifact file already missing");
            }
            Err(e) => {
                entries.insert(artifact.filename.clone(), artifact);
                return Err(StorageError::Io(e));
            }
        }

        metrics::gauge!(REGISTRY_SIZE_GAUGE).set(entries.len() as f64);
        debug!(filename, "Deleted artifact");
        Ok(true)
    }

    /// Names of artifacts strictly older than `retention` at `now`.
    pub async fn list_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<String> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|a| a.is_expired(now, retention))
            .map(|a| a.filename.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Register files left in the root by a previous process.
    ///
    /// Scratch files (`input_*`, `upload_*`, `norm_*`) are deleted; other valid
    /// names are adopted with their modification time as creation time so the
    /// normal retention policy applies to them.
    pub async fn adopt_existing(&self) -> StorageResult<AdoptReport> {
        let mut report = AdoptReport::default();
        let mut dir = tokio::fs::read_dir(self.root.path()).await?;

        while let Some(entry) = dir.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            if StorageRoot::is_transient(&name) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => report.removed += 1,
                    Err(e) => warn!(filename = %name, error = %e, "Failed to remove stale input"),
                }
                continue;
            }
            if !is_valid_artifact_name(&name) {
                continue;
            }

            let created_at = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let artifact =
                Artifact::new(name, ArtifactKind::Adopted, metadata.len()).created_at(created_at);
            self.register(artifact).await?;
            report.adopted += 1;
        }

        if report.adopted > 0 || report.removed > 0 {
            info!(
                adopted = report.adopted,
                removed = report.removed,
                "Recovered files from previous run"
            );
        }
        Ok(report)
    }
}
