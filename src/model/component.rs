use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::plugin::manifest::PluginId;

/// Kinds of installable content a plugin can ship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Agent persona, a single markdown file.
    Agent,
    /// Slash-command template, a single file that may sit in a subdirectory.
    Command,
    /// Skill, a whole directory tree rooted at its `SKILL.md`.
    Skill,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Agent,
        ComponentKind::Command,
        ComponentKind::Skill,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentKind::Agent => "agent",
            ComponentKind::Command => "command",
            ComponentKind::Skill => "skill",
        }
    }

    /// Subdirectory of a plugin assumed when its manifest does not name one.
    pub fn default_root(self) -> &'static str {
        match self {
            ComponentKind::Agent => "agents",
            ComponentKind::Command => "commands",
            ComponentKind::Skill => "skills",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One installable unit discovered inside a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub kind: ComponentKind,
    pub plugin_id: PluginId,
    /// Absolute path of the file, or of the directory root for skills.
    pub source_path: PathBuf,
    /// Placement and bookkeeping path, relative to the kind's root.
    pub relative_identifier: PathBuf,
    pub is_directory: bool,
}

impl Component {
    pub fn label(&self) -> String {
        format!(
            "{}:{}/{}",
            self.plugin_id,
            self.kind,
            self.relative_identifier.display()
        )
    }
}
