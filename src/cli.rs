use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::plugin::conflict::ConflictPolicy;

/// Discover agent plugins and install them into coding-assistant layouts.
#[derive(Parser, Debug)]
#[command(name = "kitwright", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Directory to search for plugins. Repeatable; replaces the configured roots.
    #[arg(long = "plugins-dir", value_name = "PATH", global = true)]
    pub plugins_dirs: Vec<PathBuf>,
    /// Extra configuration file merged over the user config.
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lists every discovered plugin.
    ListPlugins,
    /// Lists the components of one plugin.
    ListComponents {
        #[arg(long, value_name = "ID")]
        plugin: String,
    },
    /// Installs plugins (and their dependencies) into a target layout.
    Install(InstallArgs),
    /// Removes what previous installs wrote into a target layout.
    Uninstall {
        #[arg(long, value_name = "ID")]
        target: String,
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
    },
    /// Reports installed components and drift for every target layout.
    Status {
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
    },
    /// Snapshots target layouts. All targets when `--target` is omitted.
    Backup {
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
        #[arg(long, value_name = "ID")]
        target: Option<String>,
    },
    /// Copies a snapshot back over its target layout.
    Restore {
        #[arg(long, value_name = "ID")]
        snapshot: String,
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
    },
    /// Prints the built-in target table.
    ListTargets,
    /// Lists snapshots, newest first.
    ListBackups {
        #[arg(long, value_name = "PATH")]
        base_path: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    #[arg(long, value_name = "ID")]
    pub target: String,
    /// Comma-separated plugin ids.
    #[arg(long, value_name = "IDS", value_delimiter = ',', required = true)]
    pub plugins: Vec<String>,
    /// Overrides `install.policy` from the config.
    #[arg(long, value_enum)]
    pub policy: Option<ConflictPolicy>,
    #[arg(long, value_name = "PATH")]
    pub base_path: Option<PathBuf>,
    /// Skips the pre-install snapshot.
    #[arg(long)]
    pub no_backup: bool,
    /// Prints the resolved plan without writing anything.
    #[arg(long)]
    pub dry_run: bool,
}
