use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::model::file_tree;
use crate::model::record::{InstallRecord, RECORD_DIR};
use crate::model::target::TargetEnvironment;
use crate::plugin::error::InstallError;

#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub destination_root: PathBuf,
    /// Record paths removed from disk.
    pub removed: Vec<String>,
    /// Paths every recorded write found already present; left untouched.
    pub kept: Vec<String>,
    /// Created paths that were gone before uninstall ran.
    pub already_missing: Vec<String>,
    /// Directories removed because they were left empty.
    pub pruned: Vec<PathBuf>,
}

/// Reverses installs into one target's destination root using its record.
pub struct UninstallEngine {
    base: PathBuf,
}

impl UninstallEngine {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn uninstall(
        &self,
        target: &'static TargetEnvironment,
    ) -> Result<UninstallReport, InstallError> {
        self.uninstall_with(target, file_tree::remove_path)
    }

    /// On the first failed removal the record is rewritten to hold only the
    /// paths not yet handled, then the error is returned.
    fn uninstall_with(
        &self,
        target: &'static TargetEnvironment,
        mut remove: impl FnMut(&Path) -> io::Result<()>,
    ) -> Result<UninstallReport, InstallError> {
        let root = target.destination_root(&self.base);
        let record = InstallRecord::load_for(&root, target.id)?.ok_or_else(|| {
            InstallError::MissingInstallRecord { root: root.clone() }
        })?;

        let mut report = UninstallReport {
            destination_root: root.clone(),
            ..UninstallReport::default()
        };
        let mut done: HashSet<String> = HashSet::new();

        // Newest paths first so nested writes go before their parents.
        for owner in record.ownership().into_iter().rev() {
            if !owner.created {
                tracing::warn!(
                    "keeping {}: it existed before kitwright wrote it",
                    owner.path
                );
                report.kept.push(owner.path.to_string());
                done.insert(owner.path.to_string());
                continue;
            }

            let path = root.join(owner.path);
            if path.symlink_metadata().is_err() {
                tracing::debug!("{} already gone", path.display());
                report.already_missing.push(owner.path.to_string());
                done.insert(owner.path.to_string());
                continue;
            }

            if let Err(err) = remove(&path) {
                tracing::error!("could not remove {}: {err}", path.display());
                let mut remaining = record.clone();
                remaining.entries.retain(|entry| !done.contains(&entry.path));
                if let Err(save_err) = remaining.save(&root) {
                    tracing::error!("could not rewrite install record: {save_err}");
                }
                return Err(InstallError::io(&path, err));
            }

            tracing::debug!("removed {}", path.display());
            report.removed.push(owner.path.to_string());
            done.insert(owner.path.to_string());

            if let Some(parent) = path.parent() {
                report.pruned.extend(self.prune(parent)?);
            }
        }

        InstallRecord::delete(&root)?;
        report.pruned.extend(self.prune(&root.join(RECORD_DIR))?);

        tracing::info!(
            target_id = target.id,
            removed = report.removed.len(),
            kept = report.kept.len(),
            "uninstall finished"
        );
        Ok(report)
    }

    fn prune(&self, start: &Path) -> Result<Vec<PathBuf>, InstallError> {
        file_tree::prune_empty_ancestors(start, &self.base)
            .map_err(|err| InstallError::io(start, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::component::ComponentKind;
    use crate::model::record::RecordEntry;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn entry(path: &str, preexisted: bool) -> RecordEntry {
        RecordEntry {
            path: path.to_string(),
            preexisted,
            plugin: Some("kit".to_string()),
            kind: Some(ComponentKind::Agent),
            digest: None,
        }
    }

    fn claude() -> &'static TargetEnvironment {
        TargetEnvironment::lookup("claude").unwrap()
    }

    #[test]
    fn removes_created_paths_and_keeps_preexisting_ones() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        write(&root, "agents/mine.md", "installed");
        write(&root, "agents/user.md", "user owned");
        write(&root, "commands/git/commit.md", "installed");
        write(&root, "skills/s/references/x.md", "installed");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![
            entry("agents/mine.md", false),
            entry("agents/user.md", true),
            entry("commands/git/commit.md", false),
            entry("skills/s", false),
        ];
        record.save(&root).unwrap();

        let report = UninstallEngine::new(tmp.path()).uninstall(claude()).unwrap();

        assert_eq!(report.kept, ["agents/user.md"]);
        assert_eq!(report.removed.len(), 3);
        assert_eq!(
            fs::read_to_string(root.join("agents/user.md")).unwrap(),
            "user owned"
        );
        assert!(!root.join("agents/mine.md").exists());
        assert!(!root.join("commands").exists());
        assert!(!root.join("skills").exists());
        assert!(!InstallRecord::path_in(&root).exists());
        assert!(!root.join(RECORD_DIR).exists());
    }

    #[test]
    fn path_created_once_is_removed_even_if_later_overwritten() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        write(&root, "agents/helper.md", "second plugin");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![
            entry("agents/helper.md", false),
            entry("agents/helper.md", true),
        ];
        record.save(&root).unwrap();

        let report = UninstallEngine::new(tmp.path()).uninstall(claude()).unwrap();
        assert_eq!(report.removed, ["agents/helper.md"]);
        assert!(!root.exists());
        assert!(tmp.path().exists());
    }

    #[test]
    fn vanished_paths_are_reported_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        let mut record = InstallRecord::new("claude");
        record.entries = vec![entry("agents/gone.md", false)];
        record.save(&root).unwrap();

        let report = UninstallEngine::new(tmp.path()).uninstall(claude()).unwrap();
        assert_eq!(report.already_missing, ["agents/gone.md"]);
        assert!(report.removed.is_empty());
    }

    #[test]
    fn missing_record_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let err = UninstallEngine::new(tmp.path())
            .uninstall(claude())
            .unwrap_err();
        assert!(matches!(err, InstallError::MissingInstallRecord { .. }));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn never_prunes_the_base_path() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("project");
        let root = base.join(".claude");
        write(&root, "agents/a.md", "installed");
        let mut record = InstallRecord::new("claude");
        record.entries = vec![entry("agents/a.md", false)];
        record.save(&root).unwrap();

        UninstallEngine::new(&base).uninstall(claude()).unwrap();
        assert!(base.is_dir());
        assert!(!root.exists());
    }

    #[test]
    fn removal_failure_rewrites_remaining_entries() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        write(&root, "agents/a.md", "installed");
        write(&root, "commands/locked/c.md", "installed");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![
            entry("commands/locked/c.md", false),
            entry("agents/a.md", false),
        ];
        record.save(&root).unwrap();

        let locked = root.join("commands/locked/c.md");
        let err = UninstallEngine::new(tmp.path())
            .uninstall_with(claude(), |path| {
                if path == locked.as_path() {
                    Err(io::Error::new(io::ErrorKind::PermissionDenied, "busy"))
                } else {
                    file_tree::remove_path(path)
                }
            })
            .unwrap_err();

        assert!(matches!(err, InstallError::Io { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(!root.join("agents/a.md").exists());
        assert!(locked.is_file());
        let remaining = InstallRecord::load(&root).unwrap().unwrap();
        let paths: Vec<_> = remaining.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, ["commands/locked/c.md"]);
    }

    #[test]
    fn record_pointing_outside_the_root_removes_nothing() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        write(tmp.path(), "outside.md", "not ours");
        write(&root, "agents/a.md", "installed");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![entry("agents/a.md", false), entry("../outside.md", false)];
        record.save(&root).unwrap();

        let err = UninstallEngine::new(tmp.path())
            .uninstall(claude())
            .unwrap_err();

        assert!(matches!(err, InstallError::Record { .. }));
        assert!(tmp.path().join("outside.md").is_file());
        assert!(root.join("agents/a.md").is_file());
    }
}
