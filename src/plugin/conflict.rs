use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::Deserialize;

use crate::model::component::{Component, ComponentKind};
use crate::model::target::TargetEnvironment;
use crate::plugin::filter::FilteredPlan;
use crate::plugin::skill_index::{self, IndexDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
pub enum ConflictPolicy {
    /// Always write, replacing whatever is there.
    #[serde(rename = "overwrite")]
    #[value(name = "overwrite")]
    Overwrite,
    /// Write only when the destination is free.
    #[serde(rename = "skip")]
    #[value(name = "skip")]
    SkipExisting,
    /// Write beside an occupied destination under the smallest free `-N`.
    #[serde(rename = "rename")]
    #[value(name = "rename")]
    RenameOnConflict,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::SkipExisting => "skip",
            ConflictPolicy::RenameOnConflict => "rename",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedAction {
    Write,
    Skip,
    /// Written under the original name with `-N` appended.
    WriteRenamed(u32),
}

impl fmt::Display for ResolvedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedAction::Write => f.write_str("write"),
            ResolvedAction::Skip => f.write_str("skip"),
            ResolvedAction::WriteRenamed(suffix) => write!(f, "write (renamed -{suffix})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub component: Component,
    /// Final destination relative to the destination root; the renamed
    /// path for `WriteRenamed`.
    pub destination: PathBuf,
    pub action: ResolvedAction,
}

/// Ordered writes for one run. Built once, consumed once.
#[derive(Debug, Clone)]
pub struct InstallationPlan {
    pub target: &'static TargetEnvironment,
    pub destination_root: PathBuf,
    pub policy: ConflictPolicy,
    pub entries: Vec<PlanEntry>,
    /// Synthesized for index-generating targets from the final skill
    /// destinations; always written.
    pub index: Option<IndexDocument>,
}

impl InstallationPlan {
    /// Relative destinations that execution will write, index included.
    pub fn writes(&self) -> impl Iterator<Item = &Path> {
        self.entries
            .iter()
            .filter(|entry| entry.action != ResolvedAction::Skip)
            .map(|entry| entry.destination.as_path())
            .chain(self.index.iter().map(|index| index.relative_path.as_path()))
    }

    pub fn skipped(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.action == ResolvedAction::Skip)
            .count()
    }
}

/// A destination counts as occupied when it exists on disk or an earlier
/// entry of the same plan already claimed it.
pub struct ConflictResolver {
    policy: ConflictPolicy,
    claimed: HashSet<PathBuf>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            claimed: HashSet::new(),
        }
    }

    pub fn resolve(mut self, filtered: FilteredPlan) -> InstallationPlan {
        let root = filtered.destination_root;
        let entries: Vec<PlanEntry> = filtered
            .components
            .into_iter()
            .map(|planned| {
                let (action, destination) = self.decide(
                    &root,
                    &planned.destination,
                    planned.component.is_directory,
                );
                tracing::debug!(
                    "{} -> {} [{action}]",
                    planned.component.label(),
                    destination.display()
                );
                PlanEntry {
                    component: planned.component,
                    destination,
                    action,
                }
            })
            .collect();

        let index = filtered.target.generates_index.then(|| {
            let summaries: Vec<_> = entries
                .iter()
                .filter(|entry| entry.component.kind == ComponentKind::Skill)
                .map(|entry| skill_index::summarize(&entry.component, &entry.destination))
                .collect();
            skill_index::render(&summaries)
        });

        InstallationPlan {
            target: filtered.target,
            destination_root: root,
            policy: self.policy,
            entries,
            index,
        }
    }

    /// Directory components are decided as one unit: the whole skill is
    /// written, skipped, or renamed together.
    fn decide(
        &mut self,
        root: &Path,
        destination: &Path,
        is_directory: bool,
    ) -> (ResolvedAction, PathBuf) {
        let occupied = self.is_occupied(root, destination);

        let decision = match (self.policy, occupied) {
            (_, false) | (ConflictPolicy::Overwrite, true) => {
                (ResolvedAction::Write, destination.to_path_buf())
            }
            (ConflictPolicy::SkipExisting, true) => {
                (ResolvedAction::Skip, destination.to_path_buf())
            }
            (ConflictPolicy::RenameOnConflict, true) => {
                let mut suffix = 1;
                let mut candidate = with_suffix(destination, suffix, is_directory);
                while self.is_occupied(root, &candidate) {
                    suffix += 1;
                    candidate = with_suffix(destination, suffix, is_directory);
                }
                (ResolvedAction::WriteRenamed(suffix), candidate)
            }
        };

        if decision.0 != ResolvedAction::Skip {
            self.claimed.insert(decision.1.clone());
        }
        decision
    }

    fn is_occupied(&self, root: &Path, destination: &Path) -> bool {
        self.claimed.contains(destination) || root.join(destination).symlink_metadata().is_ok()
    }
}

/// `helper.md` -> `helper-2.md`; directories and extensionless names get
/// the suffix at the end.
fn with_suffix(path: &Path, suffix: u32, is_directory: bool) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let renamed = match (is_directory, path.file_stem(), path.extension()) {
        (false, Some(stem), Some(ext)) => format!(
            "{}-{suffix}.{}",
            stem.to_string_lossy(),
            ext.to_string_lossy()
        ),
        _ => format!("{name}-{suffix}"),
    };

    path.with_file_name(renamed)
}
