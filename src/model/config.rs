use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugin::conflict::ConflictPolicy;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub install: InstallConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    pub plugin_roots: Vec<PathBuf>,
    pub base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct InstallConfig {
    pub policy: ConflictPolicy,
    pub backup: bool,
}

impl AppConfig {
    /// Load configuration with layering: defaults → user config → explicit
    /// file. Later layers are merged key by key over earlier ones.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut table: toml::Table = toml::from_str(defaults)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "kitwright") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                merge_tables(&mut table, read_table(&config_path)?);
            }
        }

        if let Some(path) = explicit {
            merge_tables(&mut table, read_table(path)?);
        }

        Self::from_table(table)
    }

    fn from_table(table: toml::Table) -> Result<Self> {
        let mut config: AppConfig = toml::Value::Table(table)
            .try_into()
            .context("invalid configuration")?;

        config.general.plugin_roots = config
            .general
            .plugin_roots
            .iter()
            .map(|root| expand_tilde(root))
            .collect();
        config.general.base_path = expand_tilde(&config.general.base_path);

        Ok(config)
    }

    pub fn plugin_roots(&self) -> &[PathBuf] {
        &self.general.plugin_roots
    }

    pub fn base_path(&self) -> &Path {
        &self.general.base_path
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

/// Tables merge recursively; any other value in `overlay` replaces the base.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

pub fn expand_tilde(path: &Path) -> PathBuf {
    let text = path.to_string_lossy();
    if !text.starts_with('~') {
        return path.to_path_buf();
    }

    if let Some(base_dirs) = directories::BaseDirs::new() {
        let home = base_dirs.home_dir().to_string_lossy();
        return PathBuf::from(text.replacen('~', &home, 1));
    }

    path.to_path_buf()
}
