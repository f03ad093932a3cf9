use crate::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_DATABASE_FILE: &str = "cuckoo.db";

/// The analysis platform's working directory and the paths derived from it.
#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    /// Open an existing working directory. The path is canonicalized so
    /// relative archive folders resolve the same way regardless of the
    /// process' current directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let root = fs::canonicalize(path)
            .map_err(|_| Error::InvalidWorkingDir(path.to_path_buf()))?;
        if !root.is_dir() {
            return Err(Error::InvalidWorkingDir(path.to_path_buf()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a configured path: absolute paths are kept, anything else is
    /// taken relative to the working directory.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.root.join("conf")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn default_database(&self) -> PathBuf {
        self.root.join(DEFAULT_DATABASE_FILE)
    }

    pub fn analyses_dir(&self) -> PathBuf {
        self.root.join("storage").join("analyses")
    }

    pub fn analysis_dir(&self, task_id: i32) -> PathBuf {
        self.analyses_dir().join(task_id.to_string())
    }

    /// Symlink to the original sample inside an analysis folder.
    pub fn binary_link(&self, task_id: i32) -> PathBuf {
        self.analysis_dir(task_id).join("binary")
    }

    pub fn report_file(&self, task_id: i32) -> PathBuf {
        self.analysis_dir(task_id).join("reports").join("report.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = WorkingDir::open(&missing).unwrap_err();
        assert!(matches!(err, Error::InvalidWorkingDir(_)));
    }

    #[test]
    fn test_open_rejects_plain_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(WorkingDir::open(&file).is_err());
    }

    #[test]
    fn test_analysis_layout() {
        let dir = tempdir().unwrap();
        let cwd = WorkingDir::open(dir.path()).unwrap();
        let root = cwd.root().to_path_buf();

        assert_eq!(cwd.analysis_dir(7), root.join("storage/analyses/7"));
        assert_eq!(cwd.binary_link(7), root.join("storage/analyses/7/binary"));
        assert_eq!(
            cwd.report_file(7),
            root.join("storage/analyses/7/reports/report.json")
        );
        assert_eq!(cwd.default_database(), root.join("cuckoo.db"));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let dir = tempdir().unwrap();
        let cwd = WorkingDir::open(dir.path()).unwrap();

        assert_eq!(cwd.resolve("binaries"), cwd.root().join("binaries"));
        assert_eq!(cwd.resolve("/srv/archive"), PathBuf::from("/srv/archive"));
    }
}
