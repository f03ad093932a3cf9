use crate::config::{RunMode, Settings};
use crate::documents::DocumentStore;
use crate::error::Error;
use crate::purge::{PurgeReport, Purger};
use crate::storage::{RelationalStore, Task, TaskKeys};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const GIB: u64 = 1 << 30;

/// Source of the free space figure the scheduler compares to the reserve.
pub trait StorageProbe {
    fn available_bytes(&mut self) -> Result<u64, Error>;
}

/// Available blocks times block size of the filesystem holding `path`.
pub struct DiskProbe {
    path: PathBuf,
}

impl DiskProbe {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl StorageProbe for DiskProbe {
    fn available_bytes(&mut self) -> Result<u64, Error> {
        Ok(fs4::available_space(&self.path)?)
    }
}

/// All tasks added on one calendar day, purged together.
#[derive(Debug, Clone)]
pub struct CohortPurge {
    pub day: NaiveDate,
    pub reports: Vec<PurgeReport>,
}

impl CohortPurge {
    pub fn tasks_deleted(&self) -> usize {
        self.reports.iter().filter(|r| r.task_deleted).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cohorts: usize,
    /// Tasks whose row was deleted.
    pub tasks: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} tasks purged from {} days", self.tasks, self.cohorts)
    }
}

/// Result of one iteration of the continuous loop.
#[derive(Debug)]
pub enum DaemonStep {
    Purged(PurgeReport),
    /// Nothing to do right now; the loop sleeps before checking again.
    Idle,
}

/// Midnight after the day `added_on` falls on.
pub fn cohort_cutoff(added_on: NaiveDateTime) -> NaiveDateTime {
    let day = added_on.date();
    day.succ_opt().unwrap_or(day).and_time(NaiveTime::MIN)
}

pub struct Scheduler<R, D, P> {
    purger: Purger<R, D>,
    probe: P,
    reserve_bytes: u64,
    poll_interval: Duration,
    /// Tasks whose row could not be deleted. Passed over when picking the
    /// next task so one stuck row cannot hold up the rest.
    skipped: HashSet<i32>,
}

impl<R, D, P> Scheduler<R, D, P>
where
    R: RelationalStore,
    D: DocumentStore,
    P: StorageProbe,
{
    pub fn new(purger: Purger<R, D>, probe: P, settings: &Settings) -> Self {
        Self {
            purger,
            probe,
            reserve_bytes: settings.reserve_bytes(),
            poll_interval: settings.poll_interval,
            skipped: HashSet::new(),
        }
    }

    pub fn purger(&mut self) -> &mut Purger<R, D> {
        &mut self.purger
    }

    pub fn probe(&mut self) -> &mut P {
        &mut self.probe
    }

    pub fn skipped(&self) -> &HashSet<i32> {
        &self.skipped
    }

    /// Run in `mode`. Only the bounded mode ever returns.
    pub fn run(&mut self, mode: RunMode) -> Result<RunSummary, Error> {
        match mode {
            RunMode::Bounded => self.run_bounded(),
            RunMode::Daemon => self.run_daemon(),
        }
    }

    pub fn low_storage(&mut self) -> Result<bool, Error> {
        let available = self.probe.available_bytes()?;
        info!("Available space - {:.2}GB", available as f64 / GIB as f64);
        Ok(available < self.reserve_bytes)
    }

    /// Oldest task that has not been skipped. At most `skipped.len()` of the
    /// oldest rows can be skipped ones, so one more is enough to find it.
    fn next_task(&mut self) -> Result<Option<Task>, Error> {
        let limit = self.skipped.len() as i64 + 1;
        let oldest = self.purger.relational().oldest_tasks(limit)?;
        Ok(oldest
            .into_iter()
            .find(|task| !self.skipped.contains(&task.id)))
    }

    fn record(&mut self, report: &PurgeReport) {
        if !report.task_deleted {
            warn!(
                "Task #{} is still in the database, skipping it for now",
                report.task_id
            );
            self.skipped.insert(report.task_id);
        }
    }

    /// Purge every task added on the oldest remaining day. `None` when no
    /// task is left apart from skipped ones.
    pub fn purge_day(&mut self) -> Result<Option<CohortPurge>, Error> {
        let Some(oldest) = self.next_task()? else {
            return Ok(None);
        };
        let cutoff = cohort_cutoff(oldest.added_on);
        let cohort: Vec<TaskKeys> = self
            .purger
            .relational()
            .tasks_before(cutoff)?
            .into_iter()
            .filter(|keys| !self.skipped.contains(&keys.task_id))
            .collect();

        let start = Instant::now();
        let mut reports = Vec::with_capacity(cohort.len());
        for keys in cohort {
            let report = self.purger.purge_task(keys);
            self.record(&report);
            reports.push(report);
        }
        debug!(
            "Purged {} tasks from {} in {:.2}s",
            reports.len(),
            oldest.added_on.date(),
            start.elapsed().as_secs_f64()
        );

        Ok(Some(CohortPurge {
            day: oldest.added_on.date(),
            reports,
        }))
    }

    /// Purge day by day until the reserve is met or nothing is left.
    pub fn run_bounded(&mut self) -> Result<RunSummary, Error> {
        let mut summary = RunSummary::default();

        while self.low_storage()? {
            let Some(cohort) = self.purge_day()? else {
                info!("No tasks left to purge");
                break;
            };
            summary.cohorts += 1;
            summary.tasks += cohort.tasks_deleted();
        }

        if !self.skipped.is_empty() {
            warn!(
                "{} tasks could not be removed from the database",
                self.skipped.len()
            );
        }
        info!("Purge finished: {}", summary);
        Ok(summary)
    }

    /// One pass of the continuous loop: purge the single oldest task when
    /// storage is low.
    pub fn step_daemon(&mut self) -> DaemonStep {
        match self.low_storage() {
            Ok(true) => {}
            Ok(false) => return DaemonStep::Idle,
            Err(e) => {
                warn!("Error reading available space: {}", e);
                return DaemonStep::Idle;
            }
        }

        match self.next_task() {
            Ok(Some(task)) => {
                let report = self.purger.purge_task(task.keys());
                self.record(&report);
                DaemonStep::Purged(report)
            }
            Ok(None) if self.skipped.is_empty() => {
                warn!("Storage is low but there are no tasks left to purge");
                DaemonStep::Idle
            }
            Ok(None) => {
                // Give the skipped tasks another try after the next sleep.
                warn!(
                    "Storage is low and only {} undeletable tasks are left",
                    self.skipped.len()
                );
                self.skipped.clear();
                DaemonStep::Idle
            }
            Err(e) => {
                warn!("Database error selecting the oldest task: {}", e);
                DaemonStep::Idle
            }
        }
    }

    pub fn run_daemon(&mut self) -> ! {
        info!(
            "Purging continuously, polling every {}s",
            self.poll_interval.as_secs()
        );
        loop {
            if let DaemonStep::Idle = self.step_daemon() {
                thread::sleep(self.poll_interval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_run_summary_display_is_plain() {
        colored::control::set_override(true);
        let line = RunSummary { cohorts: 2, tasks: 5 }.to_string();
        colored::control::unset_override();

        assert_eq!(line, "5 tasks purged from 2 days");
    }

    #[test]
    fn test_cohort_cutoff_is_next_midnight() {
        assert_eq!(cohort_cutoff(at("2024-03-10 00:00:00")), at("2024-03-11 00:00:00"));
        assert_eq!(cohort_cutoff(at("2024-03-10 23:59:59")), at("2024-03-11 00:00:00"));
        assert_eq!(cohort_cutoff(at("2024-02-29 12:00:00")), at("2024-03-01 00:00:00"));
        assert_eq!(cohort_cutoff(at("2023-12-31 08:30:00")), at("2024-01-01 00:00:00"));
    }
}
