use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::model::component::ComponentKind;
use crate::model::file_tree;
use crate::model::record::{InstallRecord, RecordEntry};
use crate::plugin::conflict::{InstallationPlan, ResolvedAction};
use crate::plugin::error::InstallError;

/// Outcome of a completed install.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub target_id: &'static str,
    pub destination_root: PathBuf,
    /// Relative destinations written by this run, in plan order.
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    pub record_path: PathBuf,
}

/// Applies an [`InstallationPlan`] to disk, strictly in plan order.
pub struct InstallationExecutor<'a> {
    plan: &'a InstallationPlan,
    record: InstallRecord,
    run: Vec<RecordEntry>,
    written: Vec<PathBuf>,
}

impl<'a> InstallationExecutor<'a> {
    /// `existing` is the record already stored in the destination root, if
    /// any; this run's writes are merged into it by path.
    pub fn new(plan: &'a InstallationPlan, existing: Option<InstallRecord>) -> Self {
        let mut record = existing.unwrap_or_else(|| InstallRecord::new(plan.target.id));
        record.timestamp = Utc::now();

        Self {
            plan,
            record,
            run: Vec::new(),
            written: Vec::new(),
        }
    }

    /// Runs the plan. The run grows one entry per completed write; on an
    /// I/O failure the remaining entries are abandoned and the partial
    /// record is persisted before returning [`InstallError::WriteFailure`].
    /// A failed write leaves its destination as it was.
    pub fn execute(mut self) -> Result<InstallReport, InstallError> {
        let plan = self.plan;
        let root = plan.destination_root.as_path();

        for entry in &plan.entries {
            if entry.action == ResolvedAction::Skip {
                tracing::debug!("skip {}", entry.destination.display());
                continue;
            }

            let destination = root.join(&entry.destination);
            let preexisted = destination.symlink_metadata().is_ok();
            let result = replace_with_copy(&entry.component.source_path, &destination)
                .and_then(|()| file_tree::digest_path(&destination));

            match result {
                Ok(digest) => self.push(
                    &entry.destination,
                    preexisted,
                    Some(entry.component.plugin_id.to_string()),
                    Some(entry.component.kind),
                    digest,
                ),
                Err(err) => return Err(self.abort(destination, err)),
            }
        }

        if let Some(index) = &plan.index {
            let destination = root.join(&index.relative_path);
            let preexisted = destination.symlink_metadata().is_ok();
            let result = write_document(&destination, &index.content)
                .and_then(|()| file_tree::digest_path(&destination));

            match result {
                Ok(digest) => self.push(&index.relative_path, preexisted, None, None, digest),
                Err(err) => return Err(self.abort(destination, err)),
            }
        }

        let record_path = self.persist()?;
        tracing::info!(
            target_id = plan.target.id,
            written = self.written.len(),
            skipped = plan.skipped(),
            "install finished"
        );

        Ok(InstallReport {
            target_id: plan.target.id,
            destination_root: root.to_path_buf(),
            written: self.written,
            skipped: plan.skipped(),
            record_path,
        })
    }

    fn push(
        &mut self,
        relative: &Path,
        preexisted: bool,
        plugin: Option<String>,
        kind: Option<ComponentKind>,
        digest: String,
    ) {
        tracing::debug!(preexisted, "wrote {}", relative.display());
        self.run.push(RecordEntry {
            path: file_tree::to_slash(relative),
            preexisted,
            plugin,
            kind,
            digest: Some(digest),
        });
        self.written.push(relative.to_path_buf());
    }

    fn persist(&mut self) -> Result<PathBuf, InstallError> {
        self.record.absorb(&self.run);
        self.run.clear();
        self.record.save(&self.plan.destination_root)
    }

    fn abort(mut self, destination: PathBuf, err: io::Error) -> InstallError {
        tracing::error!("write to {} failed: {err}", destination.display());
        if !self.written.is_empty() {
            if let Err(save_err) = self.persist() {
                tracing::error!("could not persist partial install record: {save_err}");
            }
        }

        InstallError::WriteFailure {
            path: destination,
            written: self.written.len(),
            source: Arc::new(err),
        }
    }
}

/// Copies `source` over `destination` as a whole, so a skill directory is
/// never a mix of old and new files.
fn replace_with_copy(source: &Path, destination: &Path) -> io::Result<()> {
    file_tree::replace_with(destination, |staged| file_tree::copy_tree(source, staged))
}

fn write_document(destination: &Path, content: &str) -> io::Result<()> {
    file_tree::replace_with(destination, |staged| fs::write(staged, content))
}
