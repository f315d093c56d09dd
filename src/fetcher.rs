use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use std::sync::{Arc, LazyLock};

use crate::config::Config;
use crate::cookies::FileJar;
use crate::util;

const UA: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36";

const AGE_GATE_MARKERS: [&str; 2] = ["over18-modal", "您必須已達您當地的法定年齡"];

static CONFIRM_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href="(/over18\?respond=1[^"]*)""#).unwrap());

/// Plain GET returning the body text.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String>;
}

#[async_trait]
impl<T: Transport> Transport for Arc<T> {
    async fn get(&self, url: &str) -> Result<String> {
        self.as_ref().get(url).await
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-TW,zh;q=0.9,en-US;q=0.8,en;q=0.7,ja;q=0.6"));
    headers
}

/// reqwest transport whose cookies live in a [`FileJar`] persisted after every request.
pub struct HttpTransport {
    client: reqwest::Client,
    jar: Arc<FileJar>,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let jar = Arc::new(FileJar::load(&config.cookie_jar_path)?);
        util::debug(format!("cookie jar {} ({} cookies)", config.cookie_jar_path.display(), jar.len()));
        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers())
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(config.request_timeout)
            .cookie_provider(Arc::clone(&jar));
        if let Some(proxy) = &config.http_proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy).context("代理地址无效")?);
        }
        let client = builder.build().context("创建 HTTP 客户端失败")?;
        Ok(Self { client, jar })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        util::debug(format!("GET {}", url));
        let sent = self.client.get(url).send().await;
        // Set-Cookie headers are already in the jar even when the status is an error.
        self.jar.save()?;
        let body = sent
            .with_context(|| format!("请求失败: {}", url))?
            .error_for_status()
            .with_context(|| format!("服务器返回错误: {}", url))?
            .text()
            .await
            .with_context(|| format!("读取响应失败: {}", url))?;
        Ok(body)
    }
}

pub fn is_age_gate(html: &str) -> bool {
    AGE_GATE_MARKERS.iter().any(|m| html.contains(m))
}

/// Absolute URL of the interstitial's "I am of age" link, if the page has one.
pub fn confirm_url(html: &str, base: &str) -> Option<String> {
    let caps = CONFIRM_LINK_RE.captures(html)?;
    let path = util::decode_entities(&caps[1]);
    Some(format!("{}{}", base.trim_end_matches('/'), path))
}

/// HTML fetcher that clears the site's age-verification interstitial.
pub struct Fetcher<T> {
    transport: T,
    base: String,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, base: impl Into<String>) -> Self {
        Self { transport, base: base.into() }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub async fn fetch(&self, url: &str) -> Result<String> {
        let html = self.transport.get(url).await?;
        if !is_age_gate(&html) {
            return Ok(html);
        }
        let Some(confirm) = confirm_url(&html, &self.base) else {
            util::debug("age gate detected but no confirmation link, returning page as-is");
            return Ok(html);
        };
        util::debug(format!("age gate detected, confirming via {}", confirm));
        self.transport
            .get(&confirm)
            .await
            .context("年龄验证确认失败")?;
        self.transport.get(url).await
    }
}
