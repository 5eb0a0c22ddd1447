use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::plugin::manifest::PluginId;

/// A plugin declaration that could not be turned into a manifest.
#[derive(Debug, Clone, Error)]
pub enum ManifestError {
    #[error("malformed manifest for plugin at {}: {reason}", root.display())]
    Malformed {
        /// Plugin root directory.
        root: PathBuf,
        reason: String,
    },
}

impl ManifestError {
    pub fn malformed(root: &Path, reason: impl Into<String>) -> Self {
        ManifestError::Malformed {
            root: root.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Non-fatal problems surfaced during discovery and selection.
#[derive(Debug, Clone)]
pub enum Warning {
    MalformedManifest(ManifestError),
    DuplicatePlugin {
        id: PluginId,
        kept: PathBuf,
        ignored: PathBuf,
    },
    MissingDependency {
        plugin: PluginId,
        dependency: String,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MalformedManifest(err) => write!(f, "{err}; plugin skipped"),
            Warning::DuplicatePlugin { id, kept, ignored } => write!(
                f,
                "duplicate plugin '{id}' at {} ignored; keeping {}",
                ignored.display(),
                kept.display()
            ),
            Warning::MissingDependency { plugin, dependency } => write!(
                f,
                "plugin '{plugin}' depends on '{dependency}', which was not found; continuing without it"
            ),
        }
    }
}

/// Fatal errors for a single invocation.
#[derive(Debug, Clone, Error)]
pub enum InstallError {
    #[error("unknown target '{id}' (known targets: {known})")]
    UnknownTarget { id: String, known: String },

    #[error("unknown plugin '{id}'")]
    UnknownPlugin { id: String },

    #[error("no plugin roots found (searched: {searched})")]
    NoPluginRoots { searched: String },

    /// An I/O error stopped the install loop. The record already holds
    /// every write that completed before it.
    #[error("failed to write {} after {written} successful writes: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        written: usize,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("no install record found under {}", root.display())]
    MissingInstallRecord { root: PathBuf },

    #[error("install record in {} belongs to target '{found}', not '{expected}'", root.display())]
    RecordTargetMismatch {
        root: PathBuf,
        expected: String,
        found: String,
    },

    #[error("unknown snapshot '{id}'")]
    UnknownSnapshot { id: String },

    #[error("unreadable record {}: {message}", path.display())]
    Record { path: PathBuf, message: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl InstallError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        InstallError::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    pub fn record(path: &Path, message: impl fmt::Display) -> Self {
        InstallError::Record {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Process exit status reported by the CLI for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            InstallError::NoPluginRoots { .. } => 2,
            InstallError::WriteFailure { .. } => 3,
            InstallError::UnknownTarget { .. } => 4,
            InstallError::UnknownSnapshot { .. } => 5,
            InstallError::UnknownPlugin { .. }
            | InstallError::MissingInstallRecord { .. }
            | InstallError::RecordTargetMismatch { .. }
            | InstallError::Record { .. }
            | InstallError::Io { .. } => 1,
        }
    }
}
