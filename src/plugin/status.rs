use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::model::component::ComponentKind;
use crate::model::file_tree;
use crate::model::record::InstallRecord;
use crate::model::target::TargetEnvironment;
use crate::plugin::error::InstallError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Intact,
    Modified,
    Missing,
    /// Present, but the record holds no digest to compare against.
    Unverified,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryState::Intact => "intact",
            EntryState::Modified => "modified",
            EntryState::Missing => "missing",
            EntryState::Unverified => "unverified",
        })
    }
}

#[derive(Debug, Clone)]
pub struct EntryStatus {
    pub path: String,
    pub plugin: Option<String>,
    pub kind: Option<ComponentKind>,
    /// False when every write found the path already present.
    pub created: bool,
    pub state: EntryState,
}

#[derive(Debug, Clone)]
pub struct RecordStatus {
    pub target_id: String,
    pub destination_root: PathBuf,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub entries: Vec<EntryStatus>,
}

impl RecordStatus {
    pub fn plugins(&self) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter_map(|entry| entry.plugin.as_deref())
            .collect()
    }

    pub fn drifted(&self) -> impl Iterator<Item = &EntryStatus> {
        self.entries.iter().filter(|entry| {
            matches!(entry.state, EntryState::Missing | EntryState::Modified)
        })
    }
}

#[derive(Debug, Default)]
pub struct StatusReport {
    pub records: Vec<RecordStatus>,
    /// Records that exist but could not be read.
    pub unreadable: Vec<InstallError>,
}

/// Inspects the record under every known target root beneath `base`.
pub fn status(base: &Path) -> StatusReport {
    let mut report = StatusReport::default();
    let mut seen = HashSet::new();

    for target in TargetEnvironment::all() {
        let root = target.destination_root(base);
        if !seen.insert(root.clone()) {
            continue;
        }

        match InstallRecord::load(&root) {
            Ok(Some(record)) => report.records.push(inspect(&root, &record)),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("{err}");
                report.unreadable.push(err);
            }
        }
    }

    report
}

fn inspect(root: &Path, record: &InstallRecord) -> RecordStatus {
    let entries = record
        .ownership()
        .into_iter()
        .map(|owner| {
            let path = root.join(owner.path);
            let state = check(&path, owner.latest.digest.as_deref());
            if matches!(state, EntryState::Missing | EntryState::Modified) {
                tracing::debug!("{} is {state}", path.display());
            }
            EntryStatus {
                path: owner.path.to_string(),
                plugin: owner.latest.plugin.clone(),
                kind: owner.latest.kind,
                created: owner.created,
                state,
            }
        })
        .collect();

    RecordStatus {
        target_id: record.target_id.clone(),
        destination_root: root.to_path_buf(),
        timestamp: record.timestamp,
        entries,
    }
}

fn check(path: &Path, digest: Option<&str>) -> EntryState {
    if path.symlink_metadata().is_err() {
        return EntryState::Missing;
    }
    let Some(expected) = digest else {
        return EntryState::Unverified;
    };

    match file_tree::digest_path(path) {
        Ok(actual) if actual == expected => EntryState::Intact,
        Ok(_) => EntryState::Modified,
        Err(err) => {
            tracing::warn!("could not read {}: {err}", path.display());
            EntryState::Modified
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::RecordEntry;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, body: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn recorded(root: &Path, relative: &str, plugin: &str) -> RecordEntry {
        RecordEntry {
            path: relative.to_string(),
            preexisted: false,
            plugin: Some(plugin.to_string()),
            kind: Some(ComponentKind::Agent),
            digest: Some(file_tree::digest_path(&root.join(relative)).unwrap()),
        }
    }

    #[test]
    fn flags_missing_and_modified_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");
        write(&root, "agents/a.md", "a");
        write(&root, "agents/b.md", "b");
        write(&root, "agents/c.md", "c");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![
            recorded(&root, "agents/a.md", "kit"),
            recorded(&root, "agents/b.md", "kit"),
            recorded(&root, "agents/c.md", "extras"),
        ];
        record.save(&root).unwrap();

        fs::write(root.join("agents/b.md"), "edited").unwrap();
        fs::remove_file(root.join("agents/c.md")).unwrap();

        let report = status(tmp.path());
        assert_eq!(report.records.len(), 1);
        let states: Vec<_> = report.records[0]
            .entries
            .iter()
            .map(|entry| entry.state)
            .collect();
        assert_eq!(
            states,
            [EntryState::Intact, EntryState::Modified, EntryState::Missing]
        );
        assert_eq!(report.records[0].drifted().count(), 2);
        assert_eq!(
            report.records[0].plugins().into_iter().collect::<Vec<_>>(),
            ["extras", "kit"]
        );
    }

    #[test]
    fn entries_without_digest_are_unverified() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".codex");
        write(&root, "skills/s/SKILL.md", "s");

        let mut record = InstallRecord::new("codex");
        record.entries = vec![RecordEntry {
            path: "skills/s".to_string(),
            preexisted: false,
            plugin: None,
            kind: Some(ComponentKind::Skill),
            digest: None,
        }];
        record.save(&root).unwrap();

        let report = status(tmp.path());
        assert_eq!(report.records[0].entries[0].state, EntryState::Unverified);
        assert_eq!(report.records[0].drifted().count(), 0);
    }

    #[test]
    fn corrupt_records_are_collected_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let broken = InstallRecord::path_in(&tmp.path().join(".opencode"));
        fs::create_dir_all(broken.parent().unwrap()).unwrap();
        fs::write(&broken, "not json").unwrap();
        InstallRecord::new("claude")
            .save(&tmp.path().join(".claude"))
            .unwrap();

        let report = status(tmp.path());
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].target_id, "claude");
        assert_eq!(report.unreadable.len(), 1);
    }

    #[test]
    fn empty_base_reports_nothing() {
        let tmp = TempDir::new().unwrap();
        let report = status(tmp.path());
        assert!(report.records.is_empty());
        assert!(report.unreadable.is_empty());
    }

    #[test]
    fn records_escaping_their_root_are_unreadable() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join(".claude");

        let mut record = InstallRecord::new("claude");
        record.entries = vec![RecordEntry {
            path: "/etc/hosts".to_string(),
            preexisted: false,
            plugin: None,
            kind: None,
            digest: None,
        }];
        record.save(&root).unwrap();

        let report = status(tmp.path());
        assert!(report.records.is_empty());
        assert!(matches!(report.unreadable[..], [InstallError::Record { .. }]));
    }
}
