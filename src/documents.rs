use crate::config::MongoSettings;
use crate::error::Error;
use mongodb::bson::{doc, Bson, Document};
use mongodb::sync::{Client, Collection, Database as MongoDatabase};
use tracing::debug;

const ANALYSIS_COLLECTION: &str = "analysis";
const CALLS_COLLECTION: &str = "calls";
const FILES_COLLECTION: &str = "fs.files";
const CHUNKS_COLLECTION: &str = "fs.chunks";

/// What a cascading delete removed for one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPurge {
    pub analysis_found: bool,
    pub files: usize,
    pub calls: usize,
}

/// References held by an analysis document to records stored beside it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisRefs {
    pub analysis_id: Option<Bson>,
    pub files: Vec<Bson>,
    pub calls: Vec<Bson>,
}

impl AnalysisRefs {
    /// Collect file and call references. Missing or null sections contribute
    /// nothing.
    pub fn from_document(analysis: &Document) -> Self {
        let mut files = Vec::new();

        if let Ok(target) = analysis.get_document("target") {
            files.extend(present(target.get("file_id")));
        }

        if let Ok(shots) = analysis.get_array("shots") {
            for shot in shots {
                if let Bson::Document(shot) = shot {
                    files.extend(present(shot.get("original")));
                }
            }
        }

        if let Ok(network) = analysis.get_document("network") {
            files.extend(present(network.get("pcap_id")));
            files.extend(present(network.get("sorted_pcap_id")));
        }

        let mut calls = Vec::new();
        if let Ok(behavior) = analysis.get_document("behavior") {
            if let Ok(processes) = behavior.get_array("processes") {
                for process in processes.iter().filter_map(Bson::as_document) {
                    if let Ok(process_calls) = process.get_array("calls") {
                        calls.extend(process_calls.iter().filter_map(|c| present(Some(c))));
                    }
                }
            }
        }

        AnalysisRefs {
            analysis_id: present(analysis.get("_id")),
            files,
            calls,
        }
    }
}

fn present(value: Option<&Bson>) -> Option<Bson> {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => None,
        Some(value) => Some(value.clone()),
    }
}

/// Primitive operations against the analysis document store. Deletes are
/// fire and forget: removing something that is not there is not an error.
pub trait DocumentStore {
    fn find_analysis(&self, task_id: i32) -> Result<Option<Document>, Error>;
    fn delete_file_chunks(&self, file_id: &Bson) -> Result<(), Error>;
    fn delete_file(&self, file_id: &Bson) -> Result<(), Error>;
    fn delete_call(&self, call_id: &Bson) -> Result<(), Error>;
    fn delete_analysis(&self, analysis_id: &Bson) -> Result<(), Error>;

    /// Remove a task's analysis document together with the files and calls
    /// it references. A task without an analysis document is a no-op.
    fn delete_task_documents(&self, task_id: i32) -> Result<DocumentPurge, Error> {
        let Some(analysis) = self.find_analysis(task_id)? else {
            debug!("No analysis document for task #{}", task_id);
            return Ok(DocumentPurge::default());
        };
        let refs = AnalysisRefs::from_document(&analysis);

        for file_id in &refs.files {
            self.delete_file_chunks(file_id)?;
            self.delete_file(file_id)?;
        }
        for call_id in &refs.calls {
            self.delete_call(call_id)?;
        }
        if let Some(analysis_id) = &refs.analysis_id {
            self.delete_analysis(analysis_id)?;
        }

        Ok(DocumentPurge {
            analysis_found: true,
            files: refs.files.len(),
            calls: refs.calls.len(),
        })
    }
}

pub struct MongoStore {
    db: MongoDatabase,
}

impl MongoStore {
    /// The driver connects lazily; an unreachable server surfaces on the
    /// first operation.
    pub fn connect(settings: &MongoSettings) -> Result<Self, Error> {
        let client = Client::with_uri_str(&settings.uri)?;
        debug!("Using document store {} database {}", settings.uri, settings.db);
        Ok(MongoStore {
            db: client.database(&settings.db),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

impl DocumentStore for MongoStore {
    fn find_analysis(&self, task_id: i32) -> Result<Option<Document>, Error> {
        Ok(self
            .collection(ANALYSIS_COLLECTION)
            .find_one(doc! { "info.id": task_id }, None)?)
    }

    fn delete_file_chunks(&self, file_id: &Bson) -> Result<(), Error> {
        self.collection(CHUNKS_COLLECTION)
            .delete_many(doc! { "files_id": file_id.clone() }, None)?;
        Ok(())
    }

    fn delete_file(&self, file_id: &Bson) -> Result<(), Error> {
        self.collection(FILES_COLLECTION)
            .delete_many(doc! { "_id": file_id.clone() }, None)?;
        Ok(())
    }

    fn delete_call(&self, call_id: &Bson) -> Result<(), Error> {
        self.collection(CALLS_COLLECTION)
            .delete_one(doc! { "_id": call_id.clone() }, None)?;
        Ok(())
    }

    fn delete_analysis(&self, analysis_id: &Bson) -> Result<(), Error> {
        self.collection(ANALYSIS_COLLECTION)
            .delete_one(doc! { "_id": analysis_id.clone() }, None)?;
        Ok(())
    }
}
