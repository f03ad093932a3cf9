use super::schema::tasks;
use chrono::NaiveDateTime;
use diesel::prelude::*;

/// One analysis run. The root unit of deletion.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: i32,
    pub target: String,
    pub added_on: NaiveDateTime,
    pub status: String,
    pub sample_id: Option<i32>,
    pub submit_id: Option<i32>,
}

impl Task {
    pub fn keys(&self) -> TaskKeys {
        TaskKeys {
            task_id: self.id,
            submit_id: self.submit_id,
            sample_id: self.sample_id,
        }
    }
}

/// The keys the purge needs to remove a task and its shared parents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKeys {
    pub task_id: i32,
    pub submit_id: Option<i32>,
    pub sample_id: Option<i32>,
}

impl From<(i32, Option<i32>, Option<i32>)> for TaskKeys {
    fn from((task_id, submit_id, sample_id): (i32, Option<i32>, Option<i32>)) -> Self {
        TaskKeys {
            task_id,
            submit_id,
            sample_id,
        }
    }
}

/// Rows removed by a single `delete_rows` call: a kind of row plus the key
/// column and value it is matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTarget {
    /// `errors` rows by `task_id`.
    ErrorsOf(i32),
    /// `guests` rows by `task_id`.
    GuestsOf(i32),
    /// `tasks_tags` links by `task_id`. The tags themselves stay.
    TagsOf(i32),
    Task(i32),
    Submit(i32),
    Sample(i32),
}

impl RowTarget {
    pub fn table_name(&self) -> &'static str {
        match self {
            RowTarget::ErrorsOf(_) => "errors",
            RowTarget::GuestsOf(_) => "guests",
            RowTarget::TagsOf(_) => "tasks_tags",
            RowTarget::Task(_) => "tasks",
            RowTarget::Submit(_) => "submit",
            RowTarget::Sample(_) => "samples",
        }
    }
}

/// A row shared between tasks, reference counted through `tasks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SharedRef {
    Submit(i32),
    Sample(i32),
}

impl SharedRef {
    pub fn row_target(&self) -> RowTarget {
        match *self {
            SharedRef::Submit(id) => RowTarget::Submit(id),
            SharedRef::Sample(id) => RowTarget::Sample(id),
        }
    }
}
