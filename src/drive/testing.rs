//! Scripted drive for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CloudDrive, DriveError};
use crate::types::{AddOutcome, DriveEntry, Task, UserInfo};

pub fn task(info_hash: &str, status: i64, percent_done: f64) -> Task {
    Task {
        info_hash: info_hash.to_string(),
        status,
        percent_done,
        name: format!("{}.mp4", info_hash),
        size: 1024 * 1024 * 1024,
        file_id: (status == 2).then(|| "9001".to_string()),
    }
}

/// Each `list_offline_tasks` call pops the next scripted snapshot; the last
/// snapshot keeps repeating.
#[derive(Default)]
pub struct FakeDrive {
    snapshots: Mutex<VecDeque<Vec<Task>>>,
    list_calls: Mutex<usize>,
    added: Mutex<Vec<(String, String)>>,
    add_result: Mutex<Option<AddOutcome>>,
    fail_listing: Mutex<bool>,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(snapshots: Vec<Vec<Task>>) -> Self {
        let drive = Self::new();
        *drive.snapshots.lock().unwrap() = snapshots.into();
        drive
    }

    pub fn reject_adds(self, error: &str) -> Self {
        *self.add_result.lock().unwrap() = Some(AddOutcome {
            ok: false,
            info_hash: None,
            error: Some(error.to_string()),
        });
        self
    }

    pub fn failing_listing(self) -> Self {
        *self.fail_listing.lock().unwrap() = true;
        self
    }

    pub fn list_calls(&self) -> usize {
        *self.list_calls.lock().unwrap()
    }

    pub fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudDrive for FakeDrive {
    async fn user_info(&self) -> Result<UserInfo, DriveError> {
        Ok(UserInfo {
            user_id: "100".to_string(),
            user_name: "tester".to_string(),
        })
    }

    async fn add_offline_download(&self, url: &str, target_dir: &str) -> Result<AddOutcome, DriveError> {
        self.added
            .lock()
            .unwrap()
            .push((url.to_string(), target_dir.to_string()));
        if let Some(rejected) = self.add_result.lock().unwrap().clone() {
            return Ok(rejected);
        }
        Ok(AddOutcome {
            ok: true,
            info_hash: crate::scraper::extract_info_hash(url).map(|h| h.to_lowercase()),
            error: None,
        })
    }

    async fn list_offline_tasks(&self) -> Result<Vec<Task>, DriveError> {
        *self.list_calls.lock().unwrap() += 1;
        if *self.fail_listing.lock().unwrap() {
            return Err(DriveError::Api("offline list unavailable".to_string()));
        }
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            Ok(snapshots.pop_front().unwrap_or_default())
        } else {
            Ok(snapshots.front().cloned().unwrap_or_default())
        }
    }

    async fn list_files(&self, _dir_id: u64, _limit: usize) -> Result<Vec<DriveEntry>, DriveError> {
        Ok(Vec::new())
    }

    async fn move_files(&self, _file_ids: &[u64], _target_dir_id: u64) -> Result<bool, DriveError> {
        Ok(true)
    }

    async fn search_files(&self, _keyword: &str, _limit: usize) -> Result<Vec<DriveEntry>, DriveError> {
        Ok(Vec::new())
    }
}
