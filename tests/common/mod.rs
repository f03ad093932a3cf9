#![allow(dead_code)]

use analysis_purge::config::{DatabaseTarget, MongoSettings, RunMode, Settings};
use analysis_purge::documents::DocumentStore;
use analysis_purge::scheduler::StorageProbe;
use analysis_purge::storage::schema::{errors, guests, samples, submit, tasks, tasks_tags};
use analysis_purge::storage::Database;
use analysis_purge::{Error, WorkingDir};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use mongodb::bson::{Bson, Document};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const GIB: u64 = 1 << 30;

pub fn settings(cwd: &WorkingDir, threshold_gib: u64) -> Settings {
    Settings {
        threshold_gib,
        mode: RunMode::Bounded,
        archive: false,
        binaries_folder: cwd.resolve("binaries"),
        reports_folder: cwd.resolve("reports"),
        poll_interval: Duration::from_secs(600),
        database: DatabaseTarget::Sqlite(cwd.default_database()),
        mongodb: MongoSettings {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            db: "cuckoo".to_string(),
        },
    }
}

pub fn working_dir(root: &Path) -> WorkingDir {
    WorkingDir::open(root).unwrap()
}

pub fn insert_submit(db: &mut Database, id: i32) {
    db.connection()
        .batch_execute(&format!(
            "INSERT INTO submit (id, added) VALUES ({}, '2024-01-01 00:00:00');",
            id
        ))
        .unwrap();
}

pub fn insert_sample(db: &mut Database, id: i32) {
    db.connection()
        .batch_execute(&format!(
            "INSERT INTO samples (id, sha256) VALUES ({}, 'sha256-{}');",
            id, id
        ))
        .unwrap();
}

/// Insert a task plus one error and one guest row pointing at it. The
/// submit and sample rows must exist already.
pub fn insert_task(db: &mut Database, id: i32, added_on: &str, submit_id: i32, sample_id: i32) {
    db.connection()
        .batch_execute(&format!(
            "INSERT INTO tasks (id, target, added_on, status, submit_id, sample_id) \
             VALUES ({id}, '/tmp/sample_{id}.exe', '{added_on}', 'reported', {submit_id}, {sample_id});
             INSERT INTO errors (message, task_id) VALUES ('analysis timed out', {id});
             INSERT INTO guests (name, task_id) VALUES ('win7x64', {id});"
        ))
        .unwrap();
}

/// A task on its own submit and sample, both numbered like the task.
pub fn insert_lone_task(db: &mut Database, id: i32, added_on: &str) {
    insert_submit(db, id);
    insert_sample(db, id);
    insert_task(db, id, added_on, id, id);
}

/// Link a task to a tag, creating the tag the first time it is used.
pub fn tag_task(db: &mut Database, task_id: i32, tag_id: i32) {
    db.connection()
        .batch_execute(&format!(
            "INSERT OR IGNORE INTO tags (id, name) VALUES ({tag_id}, 'tag-{tag_id}');
             INSERT INTO tasks_tags (task_id, tag_id) VALUES ({task_id}, {tag_id});"
        ))
        .unwrap();
}

pub fn tag_link_count(db: &mut Database) -> i64 {
    tasks_tags::table.count().get_result(db.connection()).unwrap()
}

pub fn task_ids(db: &mut Database) -> Vec<i32> {
    tasks::table
        .select(tasks::id)
        .order(tasks::id.asc())
        .load(db.connection())
        .unwrap()
}

pub fn submit_ids(db: &mut Database) -> Vec<i32> {
    submit::table
        .select(submit::id)
        .order(submit::id.asc())
        .load(db.connection())
        .unwrap()
}

pub fn sample_ids(db: &mut Database) -> Vec<i32> {
    samples::table
        .select(samples::id)
        .order(samples::id.asc())
        .load(db.connection())
        .unwrap()
}

pub fn error_count(db: &mut Database) -> i64 {
    errors::table.count().get_result(db.connection()).unwrap()
}

pub fn guest_count(db: &mut Database) -> i64 {
    guests::table.count().get_result(db.connection()).unwrap()
}

/// Analysis folder with a `binary` symlink to a sample stored beside the
/// analyses and a report.
pub fn create_analysis_folder(cwd: &WorkingDir, task_id: i32, report: &[u8]) {
    let binaries = cwd.root().join("storage").join("binaries");
    fs::create_dir_all(&binaries).unwrap();
    let sample = binaries.join(format!("sha256-{}", task_id));
    fs::write(&sample, format!("MZ sample {}", task_id)).unwrap();

    let reports = cwd.analysis_dir(task_id).join("reports");
    fs::create_dir_all(&reports).unwrap();
    fs::write(reports.join("report.json"), report).unwrap();
    std::os::unix::fs::symlink(&sample, cwd.binary_link(task_id)).unwrap();
}

/// In-memory stand-in for the document store, keeping the same collections
/// the real store uses.
#[derive(Default)]
pub struct MemoryDocuments {
    pub analysis: RefCell<Vec<Document>>,
    pub files: RefCell<Vec<Document>>,
    pub chunks: RefCell<Vec<Document>>,
    pub calls: RefCell<Vec<Document>>,
    pub fail: Cell<bool>,
}

impl MemoryDocuments {
    fn check(&self) -> Result<(), Error> {
        if self.fail.get() {
            return Err(Error::Other("document store unreachable".to_string()));
        }
        Ok(())
    }

    /// Store a file record and `chunks` chunk records for it.
    pub fn add_file(&self, file_id: &Bson, chunks: usize) {
        self.files
            .borrow_mut()
            .push(mongodb::bson::doc! { "_id": file_id.clone(), "length": 1024 });
        for n in 0..chunks {
            self.chunks.borrow_mut().push(mongodb::bson::doc! {
                "files_id": file_id.clone(),
                "n": n as i32,
            });
        }
    }

    pub fn add_call(&self, call_id: &Bson) {
        self.calls
            .borrow_mut()
            .push(mongodb::bson::doc! { "_id": call_id.clone(), "calls": [] });
    }
}

fn remove_where(collection: &RefCell<Vec<Document>>, key: &str, value: &Bson) {
    collection
        .borrow_mut()
        .retain(|document| document.get(key) != Some(value));
}

impl DocumentStore for MemoryDocuments {
    fn find_analysis(&self, task_id: i32) -> Result<Option<Document>, Error> {
        self.check()?;
        Ok(self
            .analysis
            .borrow()
            .iter()
            .find(|a| {
                a.get_document("info")
                    .ok()
                    .and_then(|info| info.get_i32("id").ok())
                    == Some(task_id)
            })
            .cloned())
    }

    fn delete_file_chunks(&self, file_id: &Bson) -> Result<(), Error> {
        self.check()?;
        remove_where(&self.chunks, "files_id", file_id);
        Ok(())
    }

    fn delete_file(&self, file_id: &Bson) -> Result<(), Error> {
        self.check()?;
        remove_where(&self.files, "_id", file_id);
        Ok(())
    }

    fn delete_call(&self, call_id: &Bson) -> Result<(), Error> {
        self.check()?;
        remove_where(&self.calls, "_id", call_id);
        Ok(())
    }

    fn delete_analysis(&self, analysis_id: &Bson) -> Result<(), Error> {
        self.check()?;
        remove_where(&self.analysis, "_id", analysis_id);
        Ok(())
    }
}

/// Replays a fixed sequence of free space readings, repeating the last one.
pub struct ScriptedProbe {
    readings: VecDeque<u64>,
    last: u64,
    pub checks: usize,
}

impl ScriptedProbe {
    pub fn new(readings: &[u64]) -> Self {
        Self {
            readings: readings.iter().copied().collect(),
            last: readings.last().copied().unwrap_or(0),
            checks: 0,
        }
    }
}

impl StorageProbe for ScriptedProbe {
    fn available_bytes(&mut self) -> Result<u64, Error> {
        self.checks += 1;
        Ok(self.readings.pop_front().unwrap_or(self.last))
    }
}

/// Free space that grows by a fixed amount for every task folder removed
/// from the analyses tree.
pub struct FolderSpaceProbe {
    pub analyses: std::path::PathBuf,
    pub base: u64,
    pub per_task: u64,
    pub initial_tasks: u64,
}

impl StorageProbe for FolderSpaceProbe {
    fn available_bytes(&mut self) -> Result<u64, Error> {
        let remaining = fs::read_dir(&self.analyses)
            .map(|entries| entries.count() as u64)
            .unwrap_or(0);
        let freed = self.initial_tasks.saturating_sub(remaining);
        Ok(self.base + freed * self.per_task)
    }
}
