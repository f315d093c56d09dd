//! File-backed javdb cookie jar.
//!
//! Cookie semantics (domain/path matching, `Expires`/`Max-Age`, deletion)
//! come from `cookie_store`; this wrapper only ties the store to a JSON file
//! that the transport rewrites after each request. There is no file locking:
//! two invocations sharing one jar file can overwrite each other's cookies.

use anyhow::{anyhow, Context, Result};
use reqwest::cookie::CookieStore as _;
use reqwest::header::HeaderValue;
use reqwest::Url;
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::MutexGuard;

use crate::util;

pub struct FileJar {
    path: PathBuf,
    store: CookieStoreMutex,
}

impl FileJar {
    /// Load the jar at `path`. A missing or unreadable file yields an empty jar.
    pub fn load(path: &Path) -> Result<Self> {
        let store = match std::fs::File::open(path) {
            Ok(file) => match cookie_store::serde::json::load(BufReader::new(file)) {
                Ok(store) => store,
                Err(e) => {
                    util::debug(format!("cookie jar {} unreadable, starting empty: {}", path.display(), e));
                    CookieStore::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CookieStore::default(),
            Err(e) => return Err(e).with_context(|| format!("读取 cookie 文件失败: {}", path.display())),
        };
        Ok(Self {
            path: path.to_path_buf(),
            store: CookieStoreMutex::new(store),
        })
    }

    /// Write every live cookie back, session cookies included.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建目录失败: {}", parent.display()))?;
        }
        let mut out = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.lock(), &mut out)
            .map_err(|e| anyhow!("序列化 cookie 失败: {}", e))?;
        std::fs::write(&self.path, out)
            .with_context(|| format!("写入 cookie 文件失败: {}", self.path.display()))
    }

    pub fn len(&self) -> usize {
        self.lock().iter_unexpired().count()
    }

    fn lock(&self) -> MutexGuard<'_, CookieStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl reqwest::cookie::CookieStore for FileJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.store.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.store.cookies(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore as _;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn header(jar: &FileJar, u: &str) -> Option<String> {
        jar.cookies(&url(u)).map(|h| h.to_str().unwrap().to_string())
    }

    fn receive(jar: &FileJar, u: &str, set_cookie: &'static str) {
        let headers = [HeaderValue::from_static(set_cookie)];
        jar.set_cookies(&mut headers.iter(), &url(u));
    }

    #[test]
    fn missing_file_gives_empty_jar() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("none.json")).unwrap();
        assert_eq!(jar.len(), 0);
        assert!(header(&jar, "https://javdb.com/").is_none());
    }

    #[test]
    fn set_cookie_then_save_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jar.json");
        let jar = FileJar::load(&path).unwrap();
        receive(&jar, "https://javdb.com/over18?respond=1", "over18=1; Domain=javdb.com; Path=/; Max-Age=86400");
        receive(&jar, "https://javdb.com/over18?respond=1", "_jdb_session=abc123; path=/; HttpOnly");
        jar.save().unwrap();

        let reloaded = FileJar::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let sent = header(&reloaded, "https://javdb.com/v/abc").unwrap();
        assert!(sent.contains("over18=1"), "{}", sent);
        assert!(sent.contains("_jdb_session=abc123"), "{}", sent);
    }

    #[test]
    fn domain_cookie_reaches_subdomains_only() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("jar.json")).unwrap();
        receive(&jar, "https://javdb.com/", "wide=1; Domain=javdb.com");
        receive(&jar, "https://javdb.com/", "narrow=2");
        assert_eq!(header(&jar, "https://www.javdb.com/").as_deref(), Some("wide=1"));
        assert!(header(&jar, "https://example.com/").is_none());
    }

    #[test]
    fn foreign_domain_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("jar.json")).unwrap();
        receive(&jar, "https://javdb.com/", "x=1; Domain=example.org");
        assert_eq!(jar.len(), 0);
        assert!(header(&jar, "https://example.org/").is_none());
    }

    #[test]
    fn past_expires_deletes_cookie() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("jar.json")).unwrap();
        receive(&jar, "https://javdb.com/", "remember_me_token=abc; Path=/");
        assert_eq!(jar.len(), 1);
        receive(&jar, "https://javdb.com/", "remember_me_token=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(jar.len(), 0);
        assert!(header(&jar, "https://javdb.com/").is_none());
    }

    #[test]
    fn max_age_zero_deletes_cookie() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("jar.json")).unwrap();
        receive(&jar, "https://javdb.com/", "token=x; Path=/");
        receive(&jar, "https://javdb.com/", "token=; Path=/; Max-Age=0");
        assert_eq!(jar.len(), 0);
    }

    #[test]
    fn future_expires_survives_reload_as_persistent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jar.json");
        let jar = FileJar::load(&path).unwrap();
        receive(&jar, "https://javdb.com/", "over18=1; Path=/; Expires=Fri, 01 Jan 2100 00:00:00 GMT");
        jar.save().unwrap();

        let reloaded = FileJar::load(&path).unwrap();
        let persistent = reloaded
            .lock()
            .get("javdb.com", "/", "over18")
            .map(|c| c.is_persistent());
        assert_eq!(persistent, Some(true));
        assert_eq!(header(&reloaded, "https://javdb.com/").as_deref(), Some("over18=1"));
    }

    #[test]
    fn secure_cookie_is_https_only() {
        let tmp = tempfile::tempdir().unwrap();
        let jar = FileJar::load(&tmp.path().join("jar.json")).unwrap();
        receive(&jar, "https://javdb.com/", "_jdb_session=sess; Path=/; Secure");
        receive(&jar, "https://javdb.com/", "over18=1; Path=/");
        assert!(header(&jar, "https://javdb.com/").unwrap().contains("_jdb_session=sess"));
        assert_eq!(header(&jar, "http://javdb.com/").as_deref(), Some("over18=1"));
    }

    #[test]
    fn unreadable_file_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jar.json");
        std::fs::write(&path, "# Netscape HTTP Cookie File\n.javdb.com\tTRUE\t/\tFALSE\t0\tover18\t1\n").unwrap();
        let jar = FileJar::load(&path).unwrap();
        assert_eq!(jar.len(), 0);
    }
}
