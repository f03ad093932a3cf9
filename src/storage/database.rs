use super::connection::AnyConnection;
use crate::config::DatabaseTarget;
use crate::error::Error;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::{PgConnection, SqliteConnection};
use tracing::debug;

pub struct Database {
    conn: AnyConnection,
}

impl Database {
    pub fn connect(target: &DatabaseTarget) -> Result<Self, Error> {
        let conn = match target {
            DatabaseTarget::Postgres(url) => {
                AnyConnection::Postgresql(PgConnection::establish(url)?)
            }
            DatabaseTarget::Sqlite(path) => {
                AnyConnection::Sqlite(SqliteConnection::establish(&path.to_string_lossy())?)
            }
        };
        let mut db = Database { conn };
        db.configure()?;
        Ok(db)
    }

    /// An empty SQLite database carrying the platform's task schema.
    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = AnyConnection::Sqlite(SqliteConnection::establish(":memory:")?);
        let mut db = Database { conn };
        db.configure()?;
        db.conn.batch_execute("PRAGMA foreign_keys = ON;")?;
        db.conn.batch_execute(include_str!("schema.sql"))?;
        Ok(db)
    }

    fn configure(&mut self) -> Result<(), Error> {
        if let AnyConnection::Sqlite(conn) = &mut self.conn {
            // The analysis pipeline writes to the same file while we purge.
            conn.batch_execute("PRAGMA busy_timeout = 60000;")?;
            debug!("SQLite busy timeout set to 60s");
        }
        Ok(())
    }

    pub fn connection(&mut self) -> &mut AnyConnection {
        &mut self.conn
    }
}
