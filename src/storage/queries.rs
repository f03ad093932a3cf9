use super::connection::AnyConnection;
use super::database::Database;
use super::models::{RowTarget, SharedRef, Task, TaskKeys};
use super::schema::{errors, guests, samples, submit, tasks, tasks_tags};
use crate::error::Error;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use tracing::warn;

/// Typed access to the task/sample/submit/error/guest/tag relations.
pub trait RelationalStore {
    /// Up to `limit` tasks with the earliest `added_on`, oldest first.
    fn oldest_tasks(&mut self, limit: i64) -> Result<Vec<Task>, Error>;

    /// The task with the earliest `added_on`, if any task is left.
    fn oldest_task(&mut self) -> Result<Option<Task>, Error> {
        Ok(self.oldest_tasks(1)?.into_iter().next())
    }

    /// Keys of every task added strictly before `cutoff`, oldest first.
    fn tasks_before(&mut self, cutoff: NaiveDateTime) -> Result<Vec<TaskKeys>, Error>;

    /// Delete every row matching `target`, one transaction per row. A row
    /// that fails to delete is rolled back and logged; the rest still go.
    /// Returns how many rows were removed.
    fn delete_rows(&mut self, target: RowTarget) -> Result<usize, Error>;

    /// Whether any task still points at the shared row. Only meaningful once
    /// the task being purged has itself been deleted.
    fn is_referenced(&mut self, shared: SharedRef) -> Result<bool, Error>;
}

impl RelationalStore for Database {
    fn oldest_tasks(&mut self, limit: i64) -> Result<Vec<Task>, Error> {
        let tasks = tasks::table
            .order((tasks::added_on.asc(), tasks::id.asc()))
            .limit(limit)
            .select(Task::as_select())
            .load(self.connection())?;
        Ok(tasks)
    }

    fn tasks_before(&mut self, cutoff: NaiveDateTime) -> Result<Vec<TaskKeys>, Error> {
        let rows: Vec<(i32, Option<i32>, Option<i32>)> = tasks::table
            .filter(tasks::added_on.lt(cutoff))
            .order((tasks::added_on.asc(), tasks::id.asc()))
            .select((tasks::id, tasks::submit_id, tasks::sample_id))
            .load(self.connection())?;
        Ok(rows.into_iter().map(TaskKeys::from).collect())
    }

    fn delete_rows(&mut self, target: RowTarget) -> Result<usize, Error> {
        let ids = matching_row_ids(self.connection(), target)?;

        let mut deleted = 0;
        for id in ids {
            let result = self
                .connection()
                .transaction(|conn| delete_row(conn, target, id));
            match result {
                Ok(count) => deleted += count,
                Err(e) => warn!(
                    "Database error deleting row {} from {}: {}",
                    id,
                    target.table_name(),
                    e
                ),
            }
        }
        Ok(deleted)
    }

    fn is_referenced(&mut self, shared: SharedRef) -> Result<bool, Error> {
        let referencing = match shared {
            SharedRef::Submit(id) => tasks::table
                .filter(tasks::submit_id.eq(id))
                .select(tasks::id)
                .first::<i32>(self.connection())
                .optional()?,
            SharedRef::Sample(id) => tasks::table
                .filter(tasks::sample_id.eq(id))
                .select(tasks::id)
                .first::<i32>(self.connection())
                .optional()?,
        };
        Ok(referencing.is_some())
    }
}

fn matching_row_ids(conn: &mut AnyConnection, target: RowTarget) -> QueryResult<Vec<i32>> {
    match target {
        RowTarget::ErrorsOf(task_id) => errors::table
            .filter(errors::task_id.eq(task_id))
            .select(errors::id)
            .load(conn),
        RowTarget::GuestsOf(task_id) => guests::table
            .filter(guests::task_id.eq(task_id))
            .select(guests::id)
            .load(conn),
        // Link rows have no id of their own; they are keyed by tag id here.
        RowTarget::TagsOf(task_id) => tasks_tags::table
            .filter(tasks_tags::task_id.eq(task_id))
            .select(tasks_tags::tag_id)
            .load(conn),
        RowTarget::Task(id) => tasks::table
            .filter(tasks::id.eq(id))
            .select(tasks::id)
            .load(conn),
        RowTarget::Submit(id) => submit::table
            .filter(submit::id.eq(id))
            .select(submit::id)
            .load(conn),
        RowTarget::Sample(id) => samples::table
            .filter(samples::id.eq(id))
            .select(samples::id)
            .load(conn),
    }
}

fn delete_row(conn: &mut AnyConnection, target: RowTarget, id: i32) -> QueryResult<usize> {
    match target {
        RowTarget::ErrorsOf(_) => diesel::delete(errors::table.find(id)).execute(conn),
        RowTarget::GuestsOf(_) => diesel::delete(guests::table.find(id)).execute(conn),
        RowTarget::TagsOf(task_id) => {
            diesel::delete(tasks_tags::table.find((task_id, id))).execute(conn)
        }
        RowTarget::Task(_) => diesel::delete(tasks::table.find(id)).execute(conn),
        RowTarget::Submit(_) => diesel::delete(submit::table.find(id)).execute(conn),
        RowTarget::Sample(_) => diesel::delete(samples::table.find(id)).execute(conn),
    }
}
