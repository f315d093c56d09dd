use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use super::{CloudDrive, DriveError, Session};
use crate::types::{AddOutcome, DriveEntry, Task, UserInfo};
use crate::util;

const UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36 115Browser/27.0.0";

const NAV_URL: &str = "https://my.115.com/?ct=ajax&ac=nav";
const OFFLINE_SPACE_URL: &str = "https://115.com/?ct=offline&ac=space";
const LIXIAN_URL: &str = "https://115.com/web/lixian/";
const FILES_URL: &str = "https://webapi.115.com/files";
const MOVE_URL: &str = "https://webapi.115.com/files/move";
const SEARCH_URL: &str = "https://webapi.115.com/files/search";

/// Signature the lixian endpoints require alongside the user id.
struct LixianSign {
    uid: String,
    sign: String,
    time: String,
}

/// 115 web API client authenticated by the saved session cookie.
pub struct Api115 {
    client: reqwest::Client,
}

impl Api115 {
    pub fn new(session: &Session, timeout: Duration) -> Result<Self, DriveError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
        headers.insert(REFERER, HeaderValue::from_static("https://115.com/"));
        let cookie = HeaderValue::from_str(session.cookie())
            .map_err(|_| DriveError::Decode("cookie 含有非法字符".to_string()))?;
        headers.insert(COOKIE, cookie);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, DriveError> {
        util::debug(format!("115 GET {} {:?}", url, query));
        let text = self
            .client
            .get(url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_body(&text)
    }

    async fn post_form(&self, url: &str, query: &[(&str, &str)], form: &[(String, String)]) -> Result<Value, DriveError> {
        util::debug(format!("115 POST {} {:?}", url, query));
        let text = self
            .client
            .post(url)
            .query(query)
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_body(&text)
    }

    async fn lixian_sign(&self) -> Result<LixianSign, DriveError> {
        let user = self.user_info().await?;
        let space = self.get_json(OFFLINE_SPACE_URL, &[]).await?;
        ensure_state(&space)?;
        let sign = space
            .get("sign")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Decode("offline space 缺少 sign".to_string()))?
            .to_string();
        let time = space
            .get("time")
            .map(value_to_string)
            .ok_or_else(|| DriveError::Decode("offline space 缺少 time".to_string()))?;
        Ok(LixianSign { uid: user.user_id, sign, time })
    }
}

fn parse_body(text: &str) -> Result<Value, DriveError> {
    serde_json::from_str(text).map_err(|e| {
        let head: String = text.chars().take(120).collect();
        DriveError::Decode(format!("{} ({})", e, head))
    })
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 115 answers `state: true` on the web API and `state: 1` on passport/qrcode.
pub(super) fn state_ok(v: &Value) -> bool {
    match v.get("state") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

pub(super) fn error_message(v: &Value) -> String {
    ["error_msg", "error", "message", "msg"]
        .iter()
        .filter_map(|k| v.get(*k))
        .find_map(|e| e.as_str().filter(|s| !s.is_empty()).map(str::to_string))
        .unwrap_or_else(|| "未知错误".to_string())
}

fn ensure_state(v: &Value) -> Result<(), DriveError> {
    if state_ok(v) {
        Ok(())
    } else {
        Err(DriveError::Api(error_message(v)))
    }
}

fn decode_list<T: DeserializeOwned>(v: &Value, key: &str) -> Result<Vec<T>, DriveError> {
    match v.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list.clone()).map_err(|e| DriveError::Decode(e.to_string())),
    }
}

fn add_outcome(v: &Value) -> AddOutcome {
    if state_ok(v) {
        AddOutcome {
            ok: true,
            info_hash: v.get("info_hash").and_then(Value::as_str).map(str::to_string),
            error: None,
        }
    } else {
        AddOutcome {
            ok: false,
            info_hash: None,
            error: Some(error_message(v)),
        }
    }
}

#[async_trait]
impl CloudDrive for Api115 {
    async fn user_info(&self) -> Result<UserInfo, DriveError> {
        let v = self.get_json(NAV_URL, &[]).await?;
        ensure_state(&v)?;
        let data = v.get("data").cloned().unwrap_or(Value::Null);
        serde_json::from_value(data).map_err(|e| DriveError::Decode(e.to_string()))
    }

    async fn add_offline_download(&self, url: &str, target_dir: &str) -> Result<AddOutcome, DriveError> {
        let sign = self.lixian_sign().await?;
        let mut form = vec![
            ("url".to_string(), url.to_string()),
            ("uid".to_string(), sign.uid),
            ("sign".to_string(), sign.sign),
            ("time".to_string(), sign.time),
        ];
        // "/" and "0" both mean the drive root; anything else is a directory id
        let dir = target_dir.trim();
        if !dir.is_empty() && dir != "/" {
            form.push(("wp_path_id".to_string(), dir.to_string()));
        }
        let v = self
            .post_form(LIXIAN_URL, &[("ct", "lixian"), ("ac", "add_task_url")], &form)
            .await?;
        Ok(add_outcome(&v))
    }

    async fn list_offline_tasks(&self) -> Result<Vec<Task>, DriveError> {
        let sign = self.lixian_sign().await?;
        let form = vec![
            ("page".to_string(), "1".to_string()),
            ("uid".to_string(), sign.uid),
            ("sign".to_string(), sign.sign),
            ("time".to_string(), sign.time),
        ];
        let v = self
            .post_form(LIXIAN_URL, &[("ct", "lixian"), ("ac", "task_lists")], &form)
            .await?;
        ensure_state(&v)?;
        decode_list(&v, "tasks")
    }

    async fn list_files(&self, dir_id: u64, limit: usize) -> Result<Vec<DriveEntry>, DriveError> {
        let query = [
            ("aid", "1".to_string()),
            ("cid", dir_id.to_string()),
            ("offset", "0".to_string()),
            ("limit", limit.to_string()),
            ("show_dir", "1".to_string()),
            ("format", "json".to_string()),
        ];
        let v = self.get_json(FILES_URL, &query).await?;
        ensure_state(&v)?;
        decode_list(&v, "data")
    }

    async fn move_files(&self, file_ids: &[u64], target_dir_id: u64) -> Result<bool, DriveError> {
        let mut form = vec![("pid".to_string(), target_dir_id.to_string())];
        for (i, id) in file_ids.iter().enumerate() {
            form.push((format!("fid[{}]", i), id.to_string()));
        }
        let v = self.post_form(MOVE_URL, &[], &form).await?;
        if !state_ok(&v) {
            util::debug(format!("115 move rejected: {}", error_message(&v)));
        }
        Ok(state_ok(&v))
    }

    async fn search_files(&self, keyword: &str, limit: usize) -> Result<Vec<DriveEntry>, DriveError> {
        let query = [
            ("search_value", keyword.to_string()),
            ("cid", "0".to_string()),
            ("offset", "0".to_string()),
            ("limit", limit.to_string()),
            ("format", "json".to_string()),
        ];
        let v = self.get_json(SEARCH_URL, &query).await?;
        ensure_state(&v)?;
        decode_list(&v, "data")
    }
}
