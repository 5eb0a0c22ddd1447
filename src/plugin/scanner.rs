use std::path::{Path, PathBuf};

use crate::model::component::{Component, ComponentKind};
use crate::model::file_tree;
use crate::plugin::manifest::PluginManifest;

/// Lists a plugin's components in kind order (agents, commands, skills),
/// each kind sorted by path. Declared roots missing on disk yield nothing;
/// unreadable entries are logged and skipped.
pub fn scan(manifest: &PluginManifest, root_dir: &Path) -> Vec<Component> {
    let mut components = Vec::new();

    for (kind, relative_root) in &manifest.declared_component_roots {
        let kind_root = root_dir.join(relative_root);
        if !kind_root.is_dir() {
            tracing::debug!(
                plugin = %manifest.id,
                "{kind} root {} absent",
                kind_root.display()
            );
            continue;
        }

        match kind {
            ComponentKind::Skill => scan_skills(manifest, &kind_root, &mut components),
            ComponentKind::Agent | ComponentKind::Command => {
                scan_files(manifest, *kind, &kind_root, &mut components)
            }
        }
    }

    components
}

fn scan_files(
    manifest: &PluginManifest,
    kind: ComponentKind,
    kind_root: &Path,
    out: &mut Vec<Component>,
) {
    for entry in file_tree::walk(kind_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(plugin = %manifest.id, "skipping unreadable entry: {err}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|file_type| file_type.is_file()) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(kind_root) else {
            continue;
        };
        if relative
            .components()
            .any(|segment| file_tree::is_hidden(segment.as_os_str()))
        {
            continue;
        }
        if !has_extension(entry.path(), &manifest.extension) {
            continue;
        }

        let relative_identifier = match kind {
            ComponentKind::Command => relative.to_path_buf(),
            _ => PathBuf::from(entry.file_name()),
        };

        out.push(Component {
            kind,
            plugin_id: manifest.id.clone(),
            source_path: entry.path().to_path_buf(),
            relative_identifier,
            is_directory: false,
        });
    }
}

fn scan_skills(manifest: &PluginManifest, kind_root: &Path, out: &mut Vec<Component>) {
    let entries = match file_tree::children(kind_root) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(
                plugin = %manifest.id,
                "cannot list skills in {}: {err}",
                kind_root.display()
            );
            return;
        }
    };

    for entry in entries {
        if !entry.file_type().is_some_and(|file_type| file_type.is_dir())
            || file_tree::is_hidden(entry.file_name())
        {
            continue;
        }

        out.push(Component {
            kind: ComponentKind::Skill,
            plugin_id: manifest.id.clone(),
            source_path: entry.path().to_path_buf(),
            relative_identifier: PathBuf::from(entry.file_name()),
            is_directory: true,
        });
    }
}

fn has_extension(path: &Path, expected: &str) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(expected))
}
