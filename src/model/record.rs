use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::component::ComponentKind;
use crate::model::file_tree;
use crate::plugin::error::InstallError;

pub const RECORD_DIR: &str = ".kitwright";
pub const RECORD_FILE: &str = "install-record.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    /// Relative to the destination root, `/`-separated.
    pub path: String,
    /// The path existed immediately before this write, and no earlier run
    /// this row supersedes created it.
    pub preexisted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// `None` for the synthesized index document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ComponentKind>,
    /// SHA-256 of the content as written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRecord {
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<RecordEntry>,
}

/// What the tool may do with one recorded path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathOwnership<'a> {
    pub path: &'a str,
    /// At least one write created the path from nothing.
    pub created: bool,
    /// Entry from the most recent write to the path.
    pub latest: &'a RecordEntry,
}

impl InstallRecord {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            timestamp: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn path_in(root: &Path) -> PathBuf {
        root.join(RECORD_DIR).join(RECORD_FILE)
    }

    pub fn load(root: &Path) -> Result<Option<Self>, InstallError> {
        let path = Self::path_in(root);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(InstallError::io(&path, err)),
        };

        let record: Self =
            serde_json::from_str(&text).map_err(|err| InstallError::record(&path, err))?;
        if let Some(entry) = record.entries.iter().find(|entry| !entry.is_relative()) {
            return Err(InstallError::record(
                &path,
                format!("entry '{}' points outside the destination root", entry.path),
            ));
        }
        Ok(Some(record))
    }

    /// Loads the record for `target_id`, refusing one written by another
    /// target into the same root.
    pub fn load_for(root: &Path, target_id: &str) -> Result<Option<Self>, InstallError> {
        match Self::load(root)? {
            Some(record) if record.target_id != target_id => Err(InstallError::RecordTargetMismatch {
                root: root.to_path_buf(),
                expected: target_id.to_string(),
                found: record.target_id,
            }),
            loaded => Ok(loaded),
        }
    }

    pub fn save(&self, root: &Path) -> Result<PathBuf, InstallError> {
        let path = Self::path_in(root);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| InstallError::io(parent, err))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|err| InstallError::record(&path, err))?;
        fs::write(&path, json + "\n").map_err(|err| InstallError::io(&path, err))?;
        Ok(path)
    }

    pub fn delete(root: &Path) -> Result<(), InstallError> {
        let path = Self::path_in(root);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(InstallError::io(&path, err)),
        }
    }

    /// Folds one run's entries into the record. Rows from earlier runs for a
    /// path the run wrote again are dropped; if any of them created the path,
    /// the run's first row for it is marked as not preexisting so ownership
    /// survives the merge.
    pub fn absorb(&mut self, run: &[RecordEntry]) {
        let rewritten: HashSet<&str> = run.iter().map(|entry| entry.path.as_str()).collect();
        let mut created: HashMap<String, bool> = HashMap::new();
        self.entries.retain(|entry| {
            if !rewritten.contains(entry.path.as_str()) {
                return true;
            }
            *created.entry(entry.path.clone()).or_default() |= !entry.preexisted;
            false
        });

        for entry in run {
            let mut entry = entry.clone();
            if created.remove(&entry.path) == Some(true) {
                entry.preexisted = false;
            }
            self.entries.push(entry);
        }
    }

    /// One row per distinct path, in order of first appearance.
    pub fn ownership(&self) -> Vec<PathOwnership<'_>> {
        let mut order: Vec<&str> = Vec::new();
        let mut by_path: BTreeMap<&str, PathOwnership<'_>> = BTreeMap::new();

        for entry in &self.entries {
            match by_path.get_mut(entry.path.as_str()) {
                Some(owner) => {
                    owner.created |= !entry.preexisted;
                    owner.latest = entry;
                }
                None => {
                    order.push(&entry.path);
                    by_path.insert(
                        &entry.path,
                        PathOwnership {
                            path: &entry.path,
                            created: !entry.preexisted,
                            latest: entry,
                        },
                    );
                }
            }
        }

        order
            .into_iter()
            .filter_map(|path| by_path.remove(path))
            .collect()
    }
}

impl RecordEntry {
    /// At least one normal segment and nothing that climbs out of the root.
    fn is_relative(&self) -> bool {
        let path = Path::new(&self.path);
        file_tree::is_contained(path)
            && path
                .components()
                .any(|segment| matches!(segment, std::path::Component::Normal(_)))
    }
}
