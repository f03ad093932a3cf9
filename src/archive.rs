use crate::config::Settings;
use crate::error::Error;
use crate::workdir::WorkingDir;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files written while archiving a single task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub binary: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Keeps the original sample and a gzipped report of a task before its
/// analysis folder is removed.
#[derive(Debug, Clone)]
pub struct Archiver {
    workdir: WorkingDir,
    binaries_folder: PathBuf,
    reports_folder: PathBuf,
}

impl Archiver {
    /// Both archive folders are created up front; failing to create either
    /// one is fatal.
    pub fn new(settings: &Settings, workdir: &WorkingDir) -> Result<Self, Error> {
        create_folder("binary", &settings.binaries_folder)?;
        create_folder("reports", &settings.reports_folder)?;
        Ok(Archiver {
            workdir: workdir.clone(),
            binaries_folder: settings.binaries_folder.clone(),
            reports_folder: settings.reports_folder.clone(),
        })
    }

    pub fn binaries_folder(&self) -> &Path {
        &self.binaries_folder
    }

    pub fn reports_folder(&self) -> &Path {
        &self.reports_folder
    }

    /// Archive the sample and the report independently. Either may be
    /// missing; that is logged and never stops the other step.
    pub fn archive(&self, task_id: i32) -> ArchiveOutcome {
        let binary = match self.archive_binary(task_id) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to archive original binary of task #{}: {}", task_id, e);
                None
            }
        };

        let report = match self.archive_report(task_id) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to archive analysis report file of task #{}: {}", task_id, e);
                None
            }
        };

        ArchiveOutcome { binary, report }
    }

    fn archive_binary(&self, task_id: i32) -> io::Result<PathBuf> {
        let link = self.workdir.binary_link(task_id);
        let mut sample = fs::read_link(&link)?;
        if sample.is_relative() {
            if let Some(parent) = link.parent() {
                sample = parent.join(sample);
            }
        }

        let file_name = sample.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("binary link points at {}", sample.display()),
            )
        })?;
        let destination = self.binaries_folder.join(file_name);
        fs::copy(&sample, &destination)?;

        debug!("Archived {} to {}", sample.display(), destination.display());
        Ok(destination)
    }

    fn archive_report(&self, task_id: i32) -> io::Result<PathBuf> {
        let report = self.workdir.report_file(task_id);
        let mut source = BufReader::new(File::open(&report)?);

        let destination = self.reports_folder.join(format!("report_{}.json.gz", task_id));
        let mut encoder = GzEncoder::new(
            BufWriter::new(File::create(&destination)?),
            Compression::default(),
        );
        io::copy(&mut source, &mut encoder)?;
        encoder.finish()?.flush()?;

        debug!("Archived {} to {}", report.display(), destination.display());
        Ok(destination)
    }
}

fn create_folder(kind: &'static str, path: &Path) -> Result<(), Error> {
    fs::create_dir_all(path).map_err(|source| Error::ArchiveFolder {
        kind,
        path: path.to_path_buf(),
        source,
    })
}
