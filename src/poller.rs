use std::time::Duration;
use tokio::time::Instant;

use crate::drive::{CloudDrive, DriveError};
use crate::types::{Task, TaskStatus};
use crate::util;

pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Complete(Task),
    Failed(Task),
    /// The hash is not in the task list at all. Not retried.
    NotFound,
    TimedOut,
}

/// First task whose info-hash matches, ignoring case.
pub fn find_task(tasks: Vec<Task>, info_hash: &str) -> Option<Task> {
    tasks.into_iter().find(|t| t.matches(info_hash))
}

/// Poll the offline task list every `interval` until the task identified by
/// `info_hash` completes, fails, disappears, or `timeout` elapses.
/// `on_progress` sees every poll where the task is still waiting or downloading.
pub async fn wait_for_completion<D, F>(
    drive: &D,
    info_hash: &str,
    timeout: Duration,
    interval: Duration,
    mut on_progress: F,
) -> Result<PollOutcome, DriveError>
where
    D: CloudDrive + ?Sized,
    F: FnMut(&Task),
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        let tasks = drive.list_offline_tasks().await?;
        let Some(task) = find_task(tasks, info_hash) else {
            util::debug(format!("poll: {} not in task list", info_hash));
            return Ok(PollOutcome::NotFound);
        };
        util::debug(format!("poll: {} status={} {}%", info_hash, task.status, task.percent_done));
        match task.state() {
            TaskStatus::Complete => return Ok(PollOutcome::Complete(task)),
            TaskStatus::Failed => return Ok(PollOutcome::Failed(task)),
            TaskStatus::Waiting | TaskStatus::Downloading | TaskStatus::Unknown(_) => on_progress(&task),
        }
        tokio::time::sleep(interval).await;
    }
    Ok(PollOutcome::TimedOut)
}
