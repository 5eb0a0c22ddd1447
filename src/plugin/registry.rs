use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::component::{Component, ComponentKind};
use crate::model::file_tree;
use crate::plugin::error::{InstallError, Warning};
use crate::plugin::manifest::{self, PluginId, PluginManifest};
use crate::plugin::scanner;

/// A plugin whose manifest parsed, with its scanned components.
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub root_dir: PathBuf,
    pub components: Vec<Component>,
}

impl DiscoveredPlugin {
    pub fn id(&self) -> &PluginId {
        &self.manifest.id
    }

    pub fn count(&self, kind: ComponentKind) -> usize {
        self.components
            .iter()
            .filter(|component| component.kind == kind)
            .count()
    }
}

/// Catalog of every plugin found under the search roots, keyed by id.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<PluginId, DiscoveredPlugin>,
    warnings: Vec<Warning>,
    roots_found: usize,
}

/// Plugins to install, dependencies first, plus advisory warnings.
#[derive(Debug)]
pub struct Selection<'a> {
    pub plugins: Vec<&'a DiscoveredPlugin>,
    pub warnings: Vec<Warning>,
}

impl PluginRegistry {
    /// Scans every search root. A root carrying a manifest is a plugin;
    /// otherwise each visible subdirectory is a plugin candidate. Bad
    /// manifests and duplicate ids become warnings; the scan continues.
    pub fn discover(roots: &[PathBuf]) -> Self {
        let mut registry = Self::default();

        for root in roots {
            if !root.is_dir() {
                tracing::debug!("plugin root {} not found", root.display());
                continue;
            }
            registry.roots_found += 1;

            for candidate in Self::candidates(root) {
                registry.admit(&candidate);
            }
        }

        tracing::info!(
            plugins = registry.plugins.len(),
            warnings = registry.warnings.len(),
            "plugin discovery finished"
        );
        registry
    }

    fn candidates(root: &Path) -> Vec<PathBuf> {
        if manifest::has_manifest(root) {
            return vec![root.to_path_buf()];
        }

        match file_tree::children(root) {
            Ok(entries) => entries
                .into_iter()
                .filter(|entry| entry.file_type().is_some_and(|kind| kind.is_dir()))
                .filter(|entry| !file_tree::is_hidden(entry.file_name()))
                .map(|entry| entry.path().to_path_buf())
                .collect(),
            Err(err) => {
                tracing::warn!("cannot list plugin root {}: {err}", root.display());
                Vec::new()
            }
        }
    }

    fn admit(&mut self, root_dir: &Path) {
        let manifest = match manifest::parse(root_dir) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!("{err}");
                self.warnings.push(Warning::MalformedManifest(err));
                return;
            }
        };

        if let Some(existing) = self.plugins.get(&manifest.id) {
            let warning = Warning::DuplicatePlugin {
                id: manifest.id.clone(),
                kept: existing.root_dir.clone(),
                ignored: root_dir.to_path_buf(),
            };
            tracing::warn!("{warning}");
            self.warnings.push(warning);
            return;
        }

        let components = scanner::scan(&manifest, root_dir);
        tracing::debug!(
            plugin = %manifest.id,
            components = components.len(),
            "plugin discovered"
        );
        self.plugins.insert(
            manifest.id.clone(),
            DiscoveredPlugin {
                manifest,
                root_dir: root_dir.to_path_buf(),
                components,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&DiscoveredPlugin> {
        self.plugins.get(id.trim())
    }

    pub fn require(&self, id: &str) -> Result<&DiscoveredPlugin, InstallError> {
        self.get(id)
            .ok_or_else(|| InstallError::UnknownPlugin { id: id.to_string() })
    }

    /// Plugins in id order.
    pub fn plugins(&self) -> impl Iterator<Item = &DiscoveredPlugin> {
        self.plugins.values()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn roots_found(&self) -> usize {
        self.roots_found
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Transitive dependency closure of `selected`. Dependencies come before
    /// the plugins that declare them; otherwise selection order is kept.
    /// Unknown selected ids are fatal, unknown dependencies are warnings.
    pub fn resolve_selection<S: AsRef<str>>(
        &self,
        selected: &[S],
    ) -> Result<Selection<'_>, InstallError> {
        let roots = selected
            .iter()
            .map(|id| self.require(id.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut selection = Selection {
            plugins: Vec::new(),
            warnings: Vec::new(),
        };
        let mut visited = HashSet::new();
        for plugin in roots {
            self.visit(plugin, &mut visited, &mut selection);
        }

        Ok(selection)
    }

    fn visit<'a>(
        &'a self,
        plugin: &'a DiscoveredPlugin,
        visited: &mut HashSet<PluginId>,
        selection: &mut Selection<'a>,
    ) {
        if !visited.insert(plugin.id().clone()) {
            return;
        }

        for dependency in &plugin.manifest.dependency_ids {
            match self.get(dependency) {
                Some(dep) => self.visit(dep, visited, selection),
                None => {
                    let warning = Warning::MissingDependency {
                        plugin: plugin.id().clone(),
                        dependency: dependency.clone(),
                    };
                    tracing::warn!("{warning}");
                    selection.warnings.push(warning);
                }
            }
        }

        selection.plugins.push(plugin);
    }
}
