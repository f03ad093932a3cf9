use crate::archive::{ArchiveOutcome, Archiver};
use crate::documents::{DocumentPurge, DocumentStore};
use crate::storage::{RelationalStore, RowTarget, SharedRef, TaskKeys};
use crate::workdir::WorkingDir;
use std::fs;
use tracing::{info, warn};

/// What happened to each store while purging one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub task_id: i32,
    pub errors_deleted: usize,
    pub guests_deleted: usize,
    pub tags_unlinked: usize,
    pub task_deleted: bool,
    pub submit_deleted: bool,
    pub sample_deleted: bool,
    /// `None` when the document store could not be cleaned.
    pub documents: Option<DocumentPurge>,
    pub archive: Option<ArchiveOutcome>,
    pub folder_removed: bool,
}

/// Deletes a task from the relational store, the document store and the
/// analysis tree, in that order.
///
/// Every step is best effort: a failure is logged and the next step still
/// runs, and re-running a purge for a task that is already gone is harmless.
/// Once the task row is deleted the task is never selected again, so data a
/// later step fails to remove stays behind; those failures are logged with
/// the task id.
pub struct Purger<R, D> {
    relational: R,
    documents: D,
    archiver: Option<Archiver>,
    workdir: WorkingDir,
}

impl<R: RelationalStore, D: DocumentStore> Purger<R, D> {
    pub fn new(relational: R, documents: D, workdir: WorkingDir) -> Self {
        Self {
            relational,
            documents,
            archiver: None,
            workdir,
        }
    }

    /// Archive each task's sample and report before its folder is removed.
    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn relational(&mut self) -> &mut R {
        &mut self.relational
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn purge_task(&mut self, keys: TaskKeys) -> PurgeReport {
        info!("Purging task ID #{}", keys.task_id);

        let mut report = PurgeReport {
            task_id: keys.task_id,
            ..Default::default()
        };

        self.purge_db(keys, &mut report);

        match self.documents.delete_task_documents(keys.task_id) {
            Ok(documents) => report.documents = Some(documents),
            Err(e) => warn!(
                "Error deleting documents of task #{}: {}",
                keys.task_id, e
            ),
        }

        self.purge_disk(keys.task_id, &mut report);

        if report.task_deleted && (report.documents.is_none() || !report.folder_removed) {
            warn!(
                "Task #{} was removed from the database but some of its data was left behind",
                keys.task_id
            );
        }

        report
    }

    /// Children first, then the task, then whichever shared parents no
    /// other task points at any more.
    fn purge_db(&mut self, keys: TaskKeys, report: &mut PurgeReport) {
        report.errors_deleted = self.delete_rows(RowTarget::ErrorsOf(keys.task_id));
        report.guests_deleted = self.delete_rows(RowTarget::GuestsOf(keys.task_id));
        report.tags_unlinked = self.delete_rows(RowTarget::TagsOf(keys.task_id));
        report.task_deleted = self.delete_rows(RowTarget::Task(keys.task_id)) > 0;

        // The task row must be gone before this check or it counts itself.
        if let Some(submit_id) = keys.submit_id {
            report.submit_deleted = self.delete_if_orphan(SharedRef::Submit(submit_id));
        }
        if let Some(sample_id) = keys.sample_id {
            report.sample_deleted = self.delete_if_orphan(SharedRef::Sample(sample_id));
        }
    }

    fn delete_rows(&mut self, target: RowTarget) -> usize {
        match self.relational.delete_rows(target) {
            Ok(count) => count,
            Err(e) => {
                warn!("Database error listing {} rows: {}", target.table_name(), e);
                0
            }
        }
    }

    fn delete_if_orphan(&mut self, shared: SharedRef) -> bool {
        match self.relational.is_referenced(shared) {
            Ok(true) => false,
            Ok(false) => self.delete_rows(shared.row_target()) > 0,
            Err(e) => {
                warn!("Database error checking references to {:?}: {}", shared, e);
                false
            }
        }
    }

    fn purge_disk(&mut self, task_id: i32, report: &mut PurgeReport) {
        if let Some(archiver) = &self.archiver {
            report.archive = Some(archiver.archive(task_id));
        }

        let analysis_folder = self.workdir.analysis_dir(task_id);
        match fs::remove_dir_all(&analysis_folder) {
            Ok(()) => report.folder_removed = true,
            Err(e) => warn!(
                "Error deleting analysis folder: {}: {}",
                analysis_folder.display(),
                e
            ),
        }
    }
}
