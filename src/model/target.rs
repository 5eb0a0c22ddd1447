use std::path::{Path, PathBuf};

use crate::model::component::ComponentKind;
use crate::plugin::error::InstallError;

/// How a component's relative identifier maps onto the destination folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementRule {
    /// Only the final path segment is kept; same-named files collide.
    Flatten,
    /// The relative identifier is kept whole.
    PreserveTree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPlacement {
    pub kind: ComponentKind,
    /// Folder under the destination root.
    pub dir: &'static str,
    pub rule: PlacementRule,
}

#[derive(Debug, PartialEq, Eq)]
pub struct TargetEnvironment {
    pub id: &'static str,
    pub description: &'static str,
    /// Folder under the user-supplied base path that owns every write.
    pub root_dir: &'static str,
    pub placements: &'static [KindPlacement],
    /// Emit a synthesized summary of every installed skill.
    pub generates_index: bool,
}

/// Destination folders for one target under a concrete base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRoots {
    pub root: PathBuf,
    pub agents: Option<PathBuf>,
    pub commands: Option<PathBuf>,
    pub skills: Option<PathBuf>,
}

pub static TARGETS: [TargetEnvironment; 4] = [
    TargetEnvironment {
        id: "claude",
        description: "Claude Code project or user directory",
        root_dir: ".claude",
        placements: &[
            KindPlacement {
                kind: ComponentKind::Agent,
                dir: "agents",
                rule: PlacementRule::Flatten,
            },
            KindPlacement {
                kind: ComponentKind::Command,
                dir: "commands",
                rule: PlacementRule::PreserveTree,
            },
            KindPlacement {
                kind: ComponentKind::Skill,
                dir: "skills",
                rule: PlacementRule::PreserveTree,
            },
        ],
        generates_index: false,
    },
    TargetEnvironment {
        id: "opencode",
        description: "OpenCode configuration directory",
        root_dir: ".opencode",
        placements: &[
            KindPlacement {
                kind: ComponentKind::Agent,
                dir: "agent",
                rule: PlacementRule::Flatten,
            },
            KindPlacement {
                kind: ComponentKind::Command,
                dir: "command",
                rule: PlacementRule::PreserveTree,
            },
            KindPlacement {
                kind: ComponentKind::Skill,
                dir: "skill",
                rule: PlacementRule::PreserveTree,
            },
        ],
        generates_index: false,
    },
    TargetEnvironment {
        id: "copilot",
        description: "GitHub Copilot repository customizations",
        root_dir: ".github",
        placements: &[
            KindPlacement {
                kind: ComponentKind::Agent,
                dir: "agents",
                rule: PlacementRule::Flatten,
            },
            KindPlacement {
                kind: ComponentKind::Skill,
                dir: "skills",
                rule: PlacementRule::PreserveTree,
            },
        ],
        generates_index: false,
    },
    TargetEnvironment {
        id: "codex",
        description: "Codex CLI skills (skills only, with generated index)",
        root_dir: ".codex",
        placements: &[KindPlacement {
            kind: ComponentKind::Skill,
            dir: "skills",
            rule: PlacementRule::PreserveTree,
        }],
        generates_index: true,
    },
];

impl TargetEnvironment {
    pub fn all() -> &'static [TargetEnvironment] {
        &TARGETS
    }

    pub fn lookup(id: &str) -> Result<&'static TargetEnvironment, InstallError> {
        TARGETS
            .iter()
            .find(|target| target.id.eq_ignore_ascii_case(id.trim()))
            .ok_or_else(|| InstallError::UnknownTarget {
                id: id.to_string(),
                known: TARGETS
                    .iter()
                    .map(|target| target.id)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn placement(&self, kind: ComponentKind) -> Option<&KindPlacement> {
        self.placements.iter().find(|placement| placement.kind == kind)
    }

    pub fn supported_kinds(&self) -> impl Iterator<Item = ComponentKind> + '_ {
        self.placements.iter().map(|placement| placement.kind)
    }

    pub fn destination_root(&self, base: &Path) -> PathBuf {
        base.join(self.root_dir)
    }

    pub fn resolve_roots(&self, base: &Path) -> TargetRoots {
        let root = self.destination_root(base);
        let folder = |kind| self.placement(kind).map(|placement| root.join(placement.dir));

        TargetRoots {
            agents: folder(ComponentKind::Agent),
            commands: folder(ComponentKind::Command),
            skills: folder(ComponentKind::Skill),
            root,
        }
    }

    /// Destination path of a component relative to the destination root,
    /// or `None` when this target does not consume the kind.
    pub fn place(&self, kind: ComponentKind, relative_identifier: &Path) -> Option<PathBuf> {
        let placement = self.placement(kind)?;
        let placed = match placement.rule {
            PlacementRule::Flatten => PathBuf::from(relative_identifier.file_name()?),
            PlacementRule::PreserveTree => relative_identifier.to_path_buf(),
        };

        Some(Path::new(placement.dir).join(placed))
    }
}
