use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::component::ComponentKind;
use crate::model::file_tree::is_contained;
use crate::plugin::error::ManifestError;

/// Declaration file read from the plugin root.
pub const MANIFEST_FILE: &str = "plugin.toml";
/// Host-native declaration, read when `plugin.toml` is absent.
pub const HOST_MANIFEST_FILE: &str = ".claude-plugin/plugin.json";

const DEFAULT_EXTENSION: &str = "md";

static PLUGIN_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*([-.][a-z0-9]+)*$").expect("valid plugin id regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PluginId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and layout of one plugin. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    pub id: PluginId,
    pub display_name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    pub author: Option<String>,
    pub dependency_ids: BTreeSet<String>,
    /// Root-relative directory per component kind.
    pub declared_component_roots: BTreeMap<ComponentKind, PathBuf>,
    /// Content-file extension for agents and commands, without the dot.
    pub extension: String,
    pub manifest_path: PathBuf,
}

impl PluginManifest {
    pub fn component_root(&self, kind: ComponentKind) -> Option<&Path> {
        self.declared_component_roots.get(&kind).map(PathBuf::as_path)
    }
}

/// On-disk shape shared by `plugin.toml` and `plugin.json`. Unknown keys
/// are ignored so newer manifests still load.
#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "displayName", alias = "display_name")]
    display_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    author: Option<AuthorField>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    agents: Option<RootField>,
    #[serde(default)]
    commands: Option<RootField>,
    #[serde(default)]
    skills: Option<RootField>,
    #[serde(default)]
    extension: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthorField {
    Name(String),
    Detailed { name: String },
}

/// A component root is either a directory name, or a list of component
/// paths as written by the host's own manifests (`["./skills/a", ...]`),
/// in which case the list's leading directory is the root.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RootField {
    Dir(String),
    Paths(Vec<String>),
}

impl RootField {
    fn directory(&self) -> Option<PathBuf> {
        match self {
            RootField::Dir(dir) => Some(PathBuf::from(dir.trim_start_matches("./"))),
            RootField::Paths(paths) => paths.first().and_then(|first| {
                Path::new(first.trim_start_matches("./"))
                    .components()
                    .next()
                    .map(|segment| PathBuf::from(segment.as_os_str()))
            }),
        }
    }
}

/// Reads and validates the manifest of the plugin rooted at `root_dir`.
pub fn parse(root_dir: &Path) -> Result<PluginManifest, ManifestError> {
    let toml_path = root_dir.join(MANIFEST_FILE);
    let json_path = root_dir.join(HOST_MANIFEST_FILE);

    let (manifest_path, raw) = if toml_path.is_file() {
        let text = read(root_dir, &toml_path)?;
        let raw = toml::from_str::<RawManifest>(&text).map_err(|err| {
            ManifestError::malformed(root_dir, format!("{}: {err}", toml_path.display()))
        })?;
        (toml_path, raw)
    } else if json_path.is_file() {
        let text = read(root_dir, &json_path)?;
        let raw = serde_json::from_str::<RawManifest>(&text).map_err(|err| {
            ManifestError::malformed(root_dir, format!("{}: {err}", json_path.display()))
        })?;
        (json_path, raw)
    } else {
        return Err(ManifestError::malformed(
            root_dir,
            format!("missing {MANIFEST_FILE} or {HOST_MANIFEST_FILE}"),
        ));
    };

    validate(root_dir, manifest_path, raw)
}

/// True when `dir` carries a declaration file of either flavor.
pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILE).is_file() || dir.join(HOST_MANIFEST_FILE).is_file()
}

fn read(root_dir: &Path, path: &Path) -> Result<String, ManifestError> {
    fs::read_to_string(path)
        .map_err(|err| ManifestError::malformed(root_dir, format!("{}: {err}", path.display())))
}

fn validate(
    root_dir: &Path,
    manifest_path: PathBuf,
    raw: RawManifest,
) -> Result<PluginManifest, ManifestError> {
    let id = required(root_dir, raw.id, "id")?;
    if !PLUGIN_ID_RE.is_match(&id) {
        return Err(ManifestError::malformed(
            root_dir,
            format!("id '{id}' must be a kebab-case slug"),
        ));
    }
    let display_name = required(root_dir, raw.display_name, "displayName")?;

    let mut declared_component_roots = BTreeMap::new();
    for (kind, field) in [
        (ComponentKind::Agent, raw.agents),
        (ComponentKind::Command, raw.commands),
        (ComponentKind::Skill, raw.skills),
    ] {
        let dir = field
            .and_then(|field| field.directory())
            .unwrap_or_else(|| PathBuf::from(kind.default_root()));
        if !is_contained(&dir) {
            return Err(ManifestError::malformed(
                root_dir,
                format!("{kind} root '{}' escapes the plugin directory", dir.display()),
            ));
        }
        declared_component_roots.insert(kind, dir);
    }

    let extension = raw
        .extension
        .map(|ext| ext.trim_start_matches('.').to_string())
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());

    Ok(PluginManifest {
        id: PluginId::new(id),
        display_name,
        description: raw.description.filter(|text| !text.trim().is_empty()),
        version: raw.version,
        author: raw.author.map(|author| match author {
            AuthorField::Name(name) | AuthorField::Detailed { name } => name,
        }),
        dependency_ids: raw
            .dependencies
            .into_iter()
            .map(|dep| dep.trim().to_string())
            .filter(|dep| !dep.is_empty())
            .collect(),
        declared_component_roots,
        extension,
        manifest_path,
    })
}

fn required(root_dir: &Path, value: Option<String>, field: &str) -> Result<String, ManifestError> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ManifestError::malformed(root_dir, format!("missing required field '{field}'")))
}
