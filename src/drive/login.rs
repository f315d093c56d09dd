//! QR-code login against 115's passport service.
//!
//! Flow: fetch a token (uid/time/sign), show the QR image URL, long-poll the
//! scan status until the phone app confirms, then exchange the uid for the
//! session cookies.

use serde_json::Value;
use std::time::Duration;

use super::api115::{error_message, state_ok};
use super::{DriveError, Session};
use crate::util;

const TOKEN_URL: &str = "https://qrcodeapi.115.com/api/1.0/web/1.0/token/";
const QRCODE_IMAGE_URL: &str = "https://qrcodeapi.115.com/api/1.0/web/1.0/qrcode";
const STATUS_URL: &str = "https://qrcodeapi.115.com/get/status/";
const LOGIN_URL: &str = "https://passportapi.115.com/app/1.0/web/1.0/login/qrcode/";

#[derive(Debug, Clone)]
pub struct QrToken {
    pub uid: String,
    pub time: String,
    pub sign: String,
}

impl QrToken {
    pub fn image_url(&self) -> String {
        format!("{}?uid={}", QRCODE_IMAGE_URL, self.uid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Waiting,
    Scanned,
    Confirmed,
    Expired,
    Cancelled,
}

impl ScanStatus {
    fn from_code(code: i64) -> Self {
        match code {
            1 => ScanStatus::Scanned,
            2 => ScanStatus::Confirmed,
            -1 => ScanStatus::Expired,
            -2 => ScanStatus::Cancelled,
            _ => ScanStatus::Waiting,
        }
    }
}

pub struct QrLogin {
    client: reqwest::Client,
}

impl QrLogin {
    pub fn new(timeout: Duration) -> Result<Self, DriveError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn json(&self, req: reqwest::RequestBuilder) -> Result<Value, DriveError> {
        let text = req.send().await?.error_for_status()?.text().await?;
        serde_json::from_str(&text).map_err(|e| DriveError::Decode(e.to_string()))
    }

    pub async fn token(&self) -> Result<QrToken, DriveError> {
        let v = self.json(self.client.get(TOKEN_URL)).await?;
        if !state_ok(&v) {
            return Err(DriveError::Api(error_message(&v)));
        }
        parse_token(&v)
    }

    pub async fn status(&self, token: &QrToken) -> Result<ScanStatus, DriveError> {
        let req = self.client.get(STATUS_URL).query(&[
            ("uid", token.uid.as_str()),
            ("time", token.time.as_str()),
            ("sign", token.sign.as_str()),
        ]);
        let v = match self.json(req).await {
            Ok(v) => v,
            // the status endpoint long-polls; a timeout just means nothing happened yet
            Err(DriveError::Http(e)) if e.is_timeout() => return Ok(ScanStatus::Waiting),
            Err(e) => return Err(e),
        };
        let code = v
            .get("data")
            .and_then(|d| d.get("status"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(ScanStatus::from_code(code))
    }

    pub async fn finish(&self, token: &QrToken) -> Result<Session, DriveError> {
        let req = self
            .client
            .post(LOGIN_URL)
            .form(&[("account", token.uid.as_str()), ("app", "web")]);
        let v = self.json(req).await?;
        if !state_ok(&v) {
            return Err(DriveError::Api(error_message(&v)));
        }
        Session::new(cookie_from_login(&v)?)
    }

    /// Poll until the scan is confirmed, expires, or `deadline` passes.
    pub async fn wait_confirmed<F: FnMut(ScanStatus)>(
        &self,
        token: &QrToken,
        deadline: Duration,
        mut on_status: F,
    ) -> Result<Session, DriveError> {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            let status = self.status(token).await?;
            util::debug(format!("qrcode status: {:?}", status));
            on_status(status);
            match status {
                ScanStatus::Confirmed => return self.finish(token).await,
                ScanStatus::Expired => return Err(DriveError::Api("二维码已过期".to_string())),
                ScanStatus::Cancelled => return Err(DriveError::Api("已取消登录".to_string())),
                ScanStatus::Waiting | ScanStatus::Scanned => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        Err(DriveError::Api("等待扫码超时".to_string()))
    }
}

fn parse_token(v: &Value) -> Result<QrToken, DriveError> {
    let data = v
        .get("data")
        .ok_or_else(|| DriveError::Decode("token 响应缺少 data".to_string()))?;
    let field = |key: &str| -> Result<String, DriveError> {
        match data.get(key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(DriveError::Decode(format!("token 响应缺少 {}", key))),
        }
    };
    Ok(QrToken {
        uid: field("uid")?,
        time: field("time")?,
        sign: field("sign")?,
    })
}

fn cookie_from_login(v: &Value) -> Result<String, DriveError> {
    let cookies = v
        .get("data")
        .and_then(|d| d.get("cookie"))
        .and_then(Value::as_object)
        .ok_or_else(|| DriveError::Decode("登录响应缺少 cookie".to_string()))?;
    let parts: Vec<String> = cookies
        .iter()
        .filter_map(|(k, val)| val.as_str().map(|s| format!("{}={}", k, s)))
        .collect();
    if parts.is_empty() {
        return Err(DriveError::Decode("登录响应 cookie 为空".to_string()));
    }
    Ok(parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_fields_accept_numbers() {
        let token = parse_token(&json!({
            "state": 1,
            "data": { "uid": "c0ffee", "time": 1700000000, "sign": "s1", "qrcode": "http://115.com/scan/dg-c0ffee" }
        }))
        .unwrap();
        assert_eq!(token.time, "1700000000");
        assert_eq!(token.image_url(), "https://qrcodeapi.115.com/api/1.0/web/1.0/qrcode?uid=c0ffee");
        assert!(parse_token(&json!({ "state": 1, "data": { "uid": "x" } })).is_err());
    }

    #[test]
    fn login_cookie_is_joined() {
        let cookie = cookie_from_login(&json!({
            "state": 1,
            "data": { "cookie": { "CID": "c", "SEID": "s", "UID": "u" } }
        }))
        .unwrap();
        assert_eq!(cookie, "CID=c; SEID=s; UID=u");
        assert!(cookie_from_login(&json!({ "state": 1, "data": {} })).is_err());
    }

    #[test]
    fn scan_codes_map() {
        assert_eq!(ScanStatus::from_code(2), ScanStatus::Confirmed);
        assert_eq!(ScanStatus::from_code(-1), ScanStatus::Expired);
        assert_eq!(ScanStatus::from_code(0), ScanStatus::Waiting);
    }
}
