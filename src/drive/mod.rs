//! 115 cloud drive access.
//!
//! Everything above this module talks to the drive through [`CloudDrive`];
//! [`Api115`] is the web-API implementation and `testing::FakeDrive` the
//! scripted one used by poller and pipeline tests.

mod api115;
pub mod login;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use std::path::Path;

use crate::types::{AddOutcome, DriveEntry, Task, UserInfo};

pub use api115::Api115;

#[derive(Debug, thiserror::Error)]
pub enum DriveError {
    #[error("未登录！请先运行: jav115 drive login")]
    NotLoggedIn,
    #[error("115 接口返回错误: {0}")]
    Api(String),
    #[error("请求 115 失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("解析 115 响应失败: {0}")]
    Decode(String),
    #[error("读写会话文件失败: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait CloudDrive: Send + Sync {
    async fn user_info(&self) -> Result<UserInfo, DriveError>;

    /// Submit a magnet (or any URL) to offline download into `target_dir`.
    /// A rejected submission is `Ok` with `ok == false`, not an error.
    async fn add_offline_download(&self, url: &str, target_dir: &str) -> Result<AddOutcome, DriveError>;

    async fn list_offline_tasks(&self) -> Result<Vec<Task>, DriveError>;

    async fn list_files(&self, dir_id: u64, limit: usize) -> Result<Vec<DriveEntry>, DriveError>;

    async fn move_files(&self, file_ids: &[u64], target_dir_id: u64) -> Result<bool, DriveError>;

    async fn search_files(&self, keyword: &str, limit: usize) -> Result<Vec<DriveEntry>, DriveError>;
}

/// Cookie string authenticating against 115 (`UID=...; CID=...; SEID=...`).
#[derive(Debug, Clone)]
pub struct Session {
    cookie: String,
}

impl Session {
    pub fn new(cookie: impl Into<String>) -> Result<Self, DriveError> {
        let cookie = cookie.into().trim().to_string();
        if cookie.is_empty() {
            return Err(DriveError::NotLoggedIn);
        }
        Ok(Self { cookie })
    }

    /// Read the saved session. A missing or blank file means not logged in.
    pub fn load(path: &Path) -> Result<Self, DriveError> {
        if !path.exists() {
            return Err(DriveError::NotLoggedIn);
        }
        Self::new(std::fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), DriveError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.cookie)?;
        Ok(())
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

/// Where `ls`/`mv` should look. Only the root and raw numeric directory ids
/// are understood; named paths are not resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRef {
    Id(u64),
    /// A path that is neither root nor a numeric id; callers list the root.
    Unresolved,
}

impl DirRef {
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        if path.is_empty() || path == "/" {
            return DirRef::Id(0);
        }
        match path.parse::<u64>() {
            Ok(id) => DirRef::Id(id),
            Err(_) => DirRef::Unresolved,
        }
    }

    pub fn id(self) -> u64 {
        match self {
            DirRef::Id(id) => id,
            DirRef::Unresolved => 0,
        }
    }
}
