use std::fs;
use std::io;
use std::path::{Component as PathComponent, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::file_tree;
use crate::plugin::error::InstallError;

pub const BACKUP_DIR: &str = ".kitwright-backups";
const DESCRIPTOR_FILE: &str = "snapshot.json";
const TREE_DIR: &str = "tree";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub id: String,
    pub target_id: String,
    /// Destination root, relative to the base path.
    pub source: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Snapshots live under `<base>/.kitwright-backups/<id>/` as a descriptor
/// and a `tree/` copy of the destination root.
pub struct BackupManager {
    base: PathBuf,
}

impl BackupManager {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn store_dir(&self) -> PathBuf {
        self.base.join(BACKUP_DIR)
    }

    /// Copies `destination_root` (which must sit under the base path) into a
    /// new snapshot. Returns `None` when there is nothing to copy yet.
    pub fn snapshot(
        &self,
        target_id: &str,
        destination_root: &Path,
    ) -> Result<Option<BackupSnapshot>, InstallError> {
        if !destination_root.is_dir() {
            tracing::debug!(
                "no snapshot: {} does not exist yet",
                destination_root.display()
            );
            return Ok(None);
        }

        let source = destination_root
            .strip_prefix(&self.base)
            .map(Path::to_path_buf)
            .map_err(|_| {
                InstallError::io(
                    destination_root,
                    io::Error::other("destination root is outside the base path"),
                )
            })?;

        let created_at = Utc::now();
        let stem = format!("{target_id}-{}", created_at.format("%Y%m%dT%H%M%SZ"));
        let mut id = stem.clone();
        let mut attempt = 1;
        while self.store_dir().join(&id).exists() {
            attempt += 1;
            id = format!("{stem}-{attempt}");
        }

        let dir = self.store_dir().join(&id);
        file_tree::copy_tree(destination_root, &dir.join(TREE_DIR))
            .map_err(|err| InstallError::io(&dir, err))?;

        let snapshot = BackupSnapshot {
            id,
            target_id: target_id.to_string(),
            source,
            created_at,
        };
        let descriptor = dir.join(DESCRIPTOR_FILE);
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|err| InstallError::record(&descriptor, err))?;
        fs::write(&descriptor, json).map_err(|err| InstallError::io(&descriptor, err))?;

        tracing::info!(
            snapshot = %snapshot.id,
            "backed up {}",
            destination_root.display()
        );
        Ok(Some(snapshot))
    }

    /// Replaces the live destination root with the snapshot's copy. Paths
    /// created after the snapshot are removed along with the newer install
    /// record, so the restored record matches the restored tree.
    pub fn restore(&self, id: &str) -> Result<BackupSnapshot, InstallError> {
        let snapshot = self.find(id)?;
        let dir = self.store_dir().join(&snapshot.id);
        if snapshot.source.as_os_str().is_empty() || !file_tree::is_contained(&snapshot.source) {
            return Err(InstallError::record(
                &dir.join(DESCRIPTOR_FILE),
                "snapshot source is outside the base path",
            ));
        }

        let tree = dir.join(TREE_DIR);
        let destination = self.base.join(&snapshot.source);
        file_tree::replace_with(&destination, |staged| file_tree::copy_tree(&tree, staged))
            .map_err(|err| InstallError::io(&destination, err))?;

        tracing::info!(
            snapshot = %snapshot.id,
            "restored {}",
            destination.display()
        );
        Ok(snapshot)
    }

    pub fn find(&self, id: &str) -> Result<BackupSnapshot, InstallError> {
        let unknown = || InstallError::UnknownSnapshot { id: id.to_string() };

        let mut segments = Path::new(id).components();
        if !matches!(
            (segments.next(), segments.next()),
            (Some(PathComponent::Normal(_)), None)
        ) {
            return Err(unknown());
        }

        let descriptor = self.store_dir().join(id).join(DESCRIPTOR_FILE);
        let text = match fs::read_to_string(&descriptor) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(unknown()),
            Err(err) => return Err(InstallError::io(&descriptor, err)),
        };

        serde_json::from_str(&text).map_err(|err| InstallError::record(&descriptor, err))
    }

    /// Snapshots under the base path, newest first. Unreadable descriptors
    /// are logged and left out.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>, InstallError> {
        let store = self.store_dir();
        if !store.is_dir() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in file_tree::children(&store).map_err(|err| InstallError::io(&store, err))? {
            let id = entry.file_name().to_string_lossy().into_owned();
            match self.find(&id) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => tracing::warn!("ignoring backup {id}: {err}"),
            }
        }

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(snapshots)
    }
}
