pub mod connection;
pub mod database;
pub mod models;
pub mod queries;
pub mod schema;

pub use connection::AnyConnection;
pub use database::Database;
pub use models::{RowTarget, SharedRef, Task, TaskKeys};
pub use queries::RelationalStore;
