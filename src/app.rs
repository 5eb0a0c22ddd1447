use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::{Command, InstallArgs};
use crate::model::component::ComponentKind;
use crate::model::config::{AppConfig, expand_tilde};
use crate::model::record::InstallRecord;
use crate::model::target::{PlacementRule, TargetEnvironment};
use crate::plugin::InstallError;
use crate::plugin::backup::BackupManager;
use crate::plugin::conflict::{ConflictResolver, InstallationPlan, ResolvedAction};
use crate::plugin::error::Warning;
use crate::plugin::filter::CapabilityFilter;
use crate::plugin::installer::InstallationExecutor;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::status;
use crate::plugin::uninstall::UninstallEngine;

pub struct App {
    config: AppConfig,
    plugin_roots: Vec<PathBuf>,
}

impl App {
    /// `plugin_dirs` from the command line replace the configured roots.
    pub fn new(config: AppConfig, plugin_dirs: Vec<PathBuf>) -> Self {
        let plugin_roots = if plugin_dirs.is_empty() {
            config.plugin_roots().to_vec()
        } else {
            plugin_dirs.iter().map(|dir| expand_tilde(dir)).collect()
        };

        Self {
            config,
            plugin_roots,
        }
    }

    pub fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::ListPlugins => self.list_plugins(),
            Command::ListComponents { plugin } => self.list_components(&plugin),
            Command::Install(args) => self.install(args),
            Command::Uninstall { target, base_path } => {
                self.uninstall(&target, &self.base(base_path))
            }
            Command::Status { base_path } => {
                self.status(&self.base(base_path));
                Ok(())
            }
            Command::Backup { base_path, target } => {
                self.backup(&self.base(base_path), target.as_deref())
            }
            Command::Restore {
                snapshot,
                base_path,
            } => self.restore(&self.base(base_path), &snapshot),
            Command::ListTargets => {
                list_targets();
                Ok(())
            }
            Command::ListBackups { base_path } => self.list_backups(&self.base(base_path)),
        }
    }

    fn base(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.map(|path| expand_tilde(&path))
            .unwrap_or_else(|| self.config.base_path().to_path_buf())
    }

    fn discover(&self) -> Result<PluginRegistry, InstallError> {
        let registry = PluginRegistry::discover(&self.plugin_roots);
        if registry.roots_found() == 0 {
            return Err(InstallError::NoPluginRoots {
                searched: self
                    .plugin_roots
                    .iter()
                    .map(|root| root.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        print_warnings(registry.warnings());
        Ok(registry)
    }

    fn list_plugins(&self) -> Result<()> {
        let registry = self.discover()?;
        if registry.is_empty() {
            println!("no plugins found");
            return Ok(());
        }

        for plugin in registry.plugins() {
            let manifest = &plugin.manifest;
            let version = manifest
                .version
                .as_deref()
                .map(|version| format!(" v{version}"))
                .unwrap_or_default();
            let counts: Vec<String> = ComponentKind::ALL
                .iter()
                .map(|&kind| format!("{kind} {}", plugin.count(kind)))
                .collect();
            println!(
                "{}{version}  {}  ({})",
                manifest.id,
                manifest.display_name,
                counts.join(", ")
            );
            if let Some(description) = &manifest.description {
                println!("    {description}");
            }
            if let Some(author) = &manifest.author {
                println!("    by {author}");
            }
            if !manifest.dependency_ids.is_empty() {
                let deps: Vec<_> = manifest.dependency_ids.iter().map(String::as_str).collect();
                println!("    depends on: {}", deps.join(", "));
            }
        }
        println!("{} plugin(s)", registry.len());
        Ok(())
    }

    fn list_components(&self, id: &str) -> Result<()> {
        let registry = self.discover()?;
        let plugin = registry.require(id)?;
        println!("{} ({})", plugin.id(), plugin.manifest.manifest_path.display());

        for component in &plugin.components {
            let suffix = if component.is_directory { "/" } else { "" };
            println!(
                "{:<8} {}{suffix}",
                component.kind,
                component.relative_identifier.display()
            );
        }
        Ok(())
    }

    fn install(&self, args: InstallArgs) -> Result<()> {
        let target = TargetEnvironment::lookup(&args.target)?;
        let base = self.base(args.base_path);
        let policy = args.policy.unwrap_or(self.config.install.policy);

        let registry = self.discover()?;
        let selection = registry.resolve_selection(&args.plugins)?;
        print_warnings(&selection.warnings);

        let filtered = CapabilityFilter::new(target).apply(&selection.plugins, &base);
        let dropped = filtered.dropped;
        let existing = InstallRecord::load_for(&filtered.destination_root, target.id)?;
        let plan = ConflictResolver::new(policy).resolve(filtered);

        if dropped > 0 {
            eprintln!(
                "note: {dropped} component(s) not supported by target '{}' were left out",
                target.id
            );
        }

        if args.dry_run {
            print_plan(&plan, &base);
            return Ok(());
        }

        if self.config.install.backup && !args.no_backup {
            if let Some(snapshot) =
                BackupManager::new(&base).snapshot(target.id, &plan.destination_root)?
            {
                println!("backup: {}", snapshot.id);
            }
        }

        let report = InstallationExecutor::new(&plan, existing).execute()?;
        println!(
            "installed {} path(s) for {} into {} ({} skipped)",
            report.written.len(),
            report.target_id,
            report.destination_root.display(),
            report.skipped
        );
        for path in &report.written {
            println!("  {}", path.display());
        }
        println!("record: {}", report.record_path.display());
        Ok(())
    }

    fn uninstall(&self, target: &str, base: &Path) -> Result<()> {
        let target = TargetEnvironment::lookup(target)?;
        let report = UninstallEngine::new(base).uninstall(target)?;

        for path in &report.removed {
            println!("removed {path}");
        }
        for path in &report.kept {
            eprintln!("warning: kept {path}: it existed before it was installed over");
        }
        for path in &report.already_missing {
            eprintln!("warning: {path} was already gone");
        }
        println!(
            "uninstalled {} path(s) from {}",
            report.removed.len(),
            report.destination_root.display()
        );
        Ok(())
    }

    fn status(&self, base: &Path) {
        let report = status::status(base);

        for err in &report.unreadable {
            eprintln!("warning: {err}");
        }
        if report.records.is_empty() {
            println!("nothing installed under {}", base.display());
            return;
        }

        for record in &report.records {
            let plugins: Vec<_> = record.plugins().into_iter().collect();
            println!(
                "{} ({}) updated {}",
                record.target_id,
                record.destination_root.display(),
                record.timestamp.to_rfc3339()
            );
            println!("  plugins: {}", plugins.join(", "));
            for entry in &record.entries {
                let owner = entry.plugin.as_deref().unwrap_or("-");
                println!("  {:<10} {} [{owner}]", entry.state, entry.path);
            }
            for entry in record.drifted() {
                eprintln!(
                    "warning: {}/{} is {}",
                    record.target_id, entry.path, entry.state
                );
            }
        }
    }

    fn backup(&self, base: &Path, target: Option<&str>) -> Result<()> {
        let targets: Vec<&'static TargetEnvironment> = match target {
            Some(id) => vec![TargetEnvironment::lookup(id)?],
            None => TargetEnvironment::all().iter().collect(),
        };

        let manager = BackupManager::new(base);
        for target in targets {
            match manager.snapshot(target.id, &target.destination_root(base))? {
                Some(snapshot) => println!("{}: {}", target.id, snapshot.id),
                None => println!("{}: nothing to back up", target.id),
            }
        }
        Ok(())
    }

    fn restore(&self, base: &Path, snapshot: &str) -> Result<()> {
        let snapshot = BackupManager::new(base).restore(snapshot)?;
        println!(
            "restored {} into {}",
            snapshot.id,
            base.join(&snapshot.source).display()
        );
        Ok(())
    }

    fn list_backups(&self, base: &Path) -> Result<()> {
        let snapshots = BackupManager::new(base).list()?;
        if snapshots.is_empty() {
            println!("no backups under {}", base.display());
        }
        for snapshot in snapshots {
            println!(
                "{}  {}  {}",
                snapshot.id,
                snapshot.target_id,
                snapshot.created_at.to_rfc3339()
            );
        }
        Ok(())
    }
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_plan(plan: &InstallationPlan, base: &Path) {
    let roots = plan.target.resolve_roots(base);
    let kinds: Vec<&str> = plan.target.supported_kinds().map(ComponentKind::as_str).collect();
    println!(
        "plan for {} into {} (policy {}, consumes {}):",
        plan.target.id,
        roots.root.display(),
        plan.policy,
        kinds.join(", ")
    );
    for (kind, folder) in [
        (ComponentKind::Agent, &roots.agents),
        (ComponentKind::Command, &roots.commands),
        (ComponentKind::Skill, &roots.skills),
    ] {
        if let Some(folder) = folder {
            println!("  {kind} folder: {}", folder.display());
        }
    }
    for entry in &plan.entries {
        println!(
            "  {:<20} {} <- {}",
            entry.action.to_string(),
            entry.destination.display(),
            entry.component.label()
        );
    }
    if let Some(index) = &plan.index {
        println!(
            "  {:<20} {}",
            ResolvedAction::Write.to_string(),
            index.relative_path.display()
        );
    }
    println!(
        "{} write(s), {} skip(s); nothing was changed",
        plan.writes().count(),
        plan.skipped()
    );
}

fn list_targets() {
    for target in TargetEnvironment::all() {
        let columns: Vec<String> = ComponentKind::ALL
            .iter()
            .map(|&kind| match target.placement(kind) {
                Some(placement) => {
                    let rule = match placement.rule {
                        PlacementRule::Flatten => "flat",
                        PlacementRule::PreserveTree => "tree",
                    };
                    format!("{kind}: {}/ ({rule})", placement.dir)
                }
                None => format!("{kind}: -"),
            })
            .collect();
        let index = if target.generates_index {
            ", index"
        } else {
            ""
        };
        println!(
            "{:<9} {:<10} {}{index}",
            target.id,
            target.root_dir,
            columns.join(", ")
        );
        println!("          {}", target.description);
    }
}
