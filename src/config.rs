use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_JAVDB_BASE: &str = "https://javdb.com";
const CONFIG_DIR_NAME: &str = ".115cli";
const SESSION_FILE: &str = "cookie.txt";
const COOKIE_JAR_FILE: &str = "javdb_cookie.json";

/// Paths and endpoints shared by every command. Built once in `main` and
/// passed down so nothing reads ambient locations on its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub javdb_base: String,
    pub http_proxy: Option<String>,
    pub config_dir: PathBuf,
    pub cookie_jar_path: PathBuf,
    pub session_path: PathBuf,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let config_dir = match env_nonempty("JAV115_HOME") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("无法确定用户主目录，请设置 JAV115_HOME")?
                .join(CONFIG_DIR_NAME),
        };
        let mut config = Self::with_dir(config_dir);
        if let Some(base) = env_nonempty("JAV115_JAVDB_BASE") {
            config.javdb_base = base.trim_end_matches('/').to_string();
        }
        config.http_proxy = env_nonempty("JAV115_HTTP_PROXY");
        Ok(config)
    }

    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self {
            javdb_base: DEFAULT_JAVDB_BASE.to_string(),
            http_proxy: None,
            cookie_jar_path: config_dir.join(COOKIE_JAR_FILE),
            session_path: config_dir.join(SESSION_FILE),
            config_dir,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("创建配置目录失败: {}", self.config_dir.display()))
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_config_dir() {
        let config = Config::with_dir(PathBuf::from("/tmp/jav115-test"));
        assert_eq!(config.session_path, PathBuf::from("/tmp/jav115-test/cookie.txt"));
        assert_eq!(config.cookie_jar_path, PathBuf::from("/tmp/jav115-test/javdb_cookie.json"));
        assert_eq!(config.javdb_base, DEFAULT_JAVDB_BASE);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn ensure_dir_creates_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::with_dir(tmp.path().join("a").join("b"));
        config.ensure_dir().unwrap();
        assert!(config.config_dir.is_dir());
    }
}
