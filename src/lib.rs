pub mod archive;
pub mod cli;
pub mod config;
pub mod documents;
pub mod error;
pub mod logging;
pub mod purge;
pub mod scheduler;
pub mod storage;
pub mod workdir;

pub use archive::Archiver;
pub use config::{RunMode, Settings};
pub use documents::{DocumentStore, MongoStore};
pub use error::Error;
pub use purge::{PurgeReport, Purger};
pub use scheduler::{DiskProbe, Scheduler, StorageProbe};
pub use storage::{Database, RelationalStore};
pub use workdir::WorkingDir;
