use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use urlencoding::encode;

use crate::config::Config;
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::types::{MagnetRecord, SearchResult, SIZE_UNKNOWN};
use crate::util;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

// One result card: detail link, <strong>code</strong> title, then the release date.
static SEARCH_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<a href="(/v/[^"]+)" class="box"[^>]*>.*?<div class="video-title"[^>]*>\s*<strong>([^<]+)</strong>\s*([^<]*)</div>.*?<div class="meta">\s*(\d{4}-\d{2}-\d{2})\s*</div>"#,
    )
    .unwrap()
});

static MAGNET_ROW_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<tr[^>]*>.*?data-clipboard-text="(magnet:\?xt=urn:btih:[^"]+)".*?<span[^>]*class="tag[^"]*"[^>]*>([^<]+)</span>.*?</tr>"#,
    )
    .unwrap()
});

static MAGNET_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"data-clipboard-text="(magnet:\?xt=urn:btih:[^"]+)""#).unwrap());

static SIZE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<span class="tag[^"]*is-success[^"]*">([^<]+)</span>"#).unwrap());

static INFO_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)btih:([a-f0-9]+)").unwrap());

/// Parse a javdb search results page into at most `limit` results, in page order.
/// Cards missing any of link, code, title block or date are skipped.
pub fn parse_search(html: &str, base: &str, limit: usize) -> Vec<SearchResult> {
    let base = base.trim_end_matches('/');
    SEARCH_ITEM_RE
        .captures_iter(html)
        .take(limit)
        .map(|caps| SearchResult {
            code: util::decode_entities(caps[2].trim()),
            title: util::decode_entities(caps[3].trim()),
            url: format!("{}{}", base, caps[1].trim()),
            date: caps[4].trim().to_string(),
        })
        .collect()
}

/// Parse the magnet table of a detail page.
///
/// Rows carrying both a clipboard magnet and a size tag are paired directly.
/// Only when no such row exists, all magnets and all `is-success` size tags
/// are collected separately and zipped by position, with `N/A` for magnets
/// past the last size. That fallback assumes the page keeps exactly one size
/// tag per magnet row in the same order; if it doesn't, sizes get attached to
/// the wrong magnet.
pub fn parse_magnets(html: &str) -> Vec<MagnetRecord> {
    let rows: Vec<MagnetRecord> = MAGNET_ROW_RE
        .captures_iter(html)
        .map(|caps| MagnetRecord {
            magnet: util::decode_entities(caps[1].trim()),
            size: caps[2].trim().to_string(),
        })
        .collect();
    if !rows.is_empty() {
        util::debug(format!("magnets: {} co-located rows", rows.len()));
        return rows;
    }

    let sizes: Vec<&str> = SIZE_TAG_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let magnets: Vec<MagnetRecord> = MAGNET_ATTR_RE
        .captures_iter(html)
        .enumerate()
        .map(|(i, caps)| MagnetRecord {
            magnet: util::decode_entities(caps[1].trim()),
            size: sizes.get(i).map(|s| s.trim()).unwrap_or(SIZE_UNKNOWN).to_string(),
        })
        .collect();
    util::debug(format!(
        "magnets: positional fallback, {} links / {} size tags",
        magnets.len(),
        sizes.len()
    ));
    magnets
}

/// The `btih:` hash of a magnet URI, case preserved.
pub fn extract_info_hash(magnet: &str) -> Option<String> {
    INFO_HASH_RE
        .captures(magnet)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Where a code's magnet lookup ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MagnetLookup {
    /// The search for the code returned nothing.
    CodeNotFound,
    /// The detail page was fetched; `magnets` may still be empty.
    Found { detail_url: String, magnets: Vec<MagnetRecord> },
}

impl MagnetLookup {
    pub fn into_magnets(self) -> Vec<MagnetRecord> {
        match self {
            MagnetLookup::CodeNotFound => Vec::new(),
            MagnetLookup::Found { magnets, .. } => magnets,
        }
    }
}

/// javdb search and magnet lookup.
///
/// Every operation returns `Err` when the site could not be fetched and an
/// empty result when the page was fetched but held nothing usable.
pub struct Catalog<T> {
    fetcher: Fetcher<T>,
}

impl Catalog<HttpTransport> {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?, &config.javdb_base))
    }
}

impl<T: Transport> Catalog<T> {
    pub fn new(transport: T, base: &str) -> Self {
        Self {
            fetcher: Fetcher::new(transport, base.trim_end_matches('/')),
        }
    }

    pub fn search_url(&self, keyword: &str) -> String {
        format!("{}/search?q={}&f=all", self.fetcher.base(), encode(keyword))
    }

    pub async fn search(&self, keyword: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let url = self.search_url(keyword);
        util::debug(format!("javdb search: {}", url));
        let html = self.fetcher.fetch(&url).await?;
        let results = parse_search(&html, self.fetcher.base(), limit);
        util::debug(format!("javdb search: {} results", results.len()));
        Ok(results)
    }

    pub async fn lookup_magnets(&self, code: &str) -> Result<MagnetLookup> {
        let Some(first) = self.search(code, 1).await?.into_iter().next() else {
            return Ok(MagnetLookup::CodeNotFound);
        };
        util::debug(format!("javdb detail: {}", first.url));
        let html = self.fetcher.fetch(&first.url).await?;
        Ok(MagnetLookup::Found {
            magnets: parse_magnets(&html),
            detail_url: first.url,
        })
    }

    pub async fn magnets_for_code(&self, code: &str) -> Result<Vec<MagnetRecord>> {
        Ok(self.lookup_magnets(code).await?.into_magnets())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::fetcher::testing::FakeTransport;
    use std::sync::Arc;

    const BASE: &str = "https://javdb.com";

    #[test]
    fn search_returns_cards_in_order_trimmed() {
        let html = search_page(&[
            card("/v/4DxWwZ", "HEYZO-3797", "First title", "2026-01-29"),
            card("/v/aBc12", "ABC-123", "Second &amp; more", "2024-05-01"),
        ]);
        let results = parse_search(&html, BASE, DEFAULT_SEARCH_LIMIT);
        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0],
            SearchResult {
                code: "HEYZO-3797".into(),
                title: "First title".into(),
                url: "https://javdb.com/v/4DxWwZ".into(),
                date: "2026-01-29".into(),
            }
        );
        assert_eq!(results[1].code, "ABC-123");
        assert_eq!(results[1].title, "Second & more");
        assert_eq!(results[1].url, "https://javdb.com/v/aBc12");
    }

    #[test]
    fn search_caps_at_limit() {
        let cards: Vec<String> = (1..=5)
            .map(|i| card(&format!("/v/id{i}"), &format!("ABC-00{i}"), "t", &format!("2024-01-0{i}")))
            .collect();
        let html = search_page(&cards);
        let results = parse_search(&html, BASE, 3);
        let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["ABC-001", "ABC-002", "ABC-003"]);
        assert_eq!(parse_search(&html, BASE, 10).len(), 5);
    }

    #[test]
    fn search_without_cards_is_empty() {
        assert!(parse_search("<html><body>暫無內容</body></html>", BASE, 10).is_empty());
        assert!(parse_search("", BASE, 10).is_empty());
    }

    #[test]
    fn card_without_date_yields_nothing() {
        let html = r#"<a href="/v/x" class="box"><div class="video-title"><strong>ABC-1</strong> t</div></a>"#;
        assert!(parse_search(html, BASE, 10).is_empty());
    }

    #[test]
    fn magnets_from_co_located_rows() {
        let html = detail_page(&[magnet_row("AAAA1111", "4.83GB"), magnet_row("bbbb2222", "1.2GB")].concat());
        let magnets = parse_magnets(&html);
        assert_eq!(
            magnets,
            vec![
                MagnetRecord {
                    magnet: "magnet:?xt=urn:btih:AAAA1111&dn=ABC-123".into(),
                    size: "4.83GB".into()
                },
                MagnetRecord {
                    magnet: "magnet:?xt=urn:btih:bbbb2222&dn=ABC-123".into(),
                    size: "1.2GB".into()
                },
            ]
        );
    }

    #[test]
    fn magnets_fall_back_to_positional_pairing() {
        // no <tr> wrappers, so the co-located pattern cannot match
        let html = r#"
            <div class="magnet"><button data-clipboard-text="magnet:?xt=urn:btih:aaa111">copy</button></div>
            <div class="magnet"><button data-clipboard-text="magnet:?xt=urn:btih:bbb222">copy</button></div>
            <div class="magnet"><button data-clipboard-text="magnet:?xt=urn:btih:ccc333">copy</button></div>
            <div class="sizes"><span class="tag is-success is-small">2.1GB</span></div>
        "#;
        let magnets = parse_magnets(html);
        assert_eq!(magnets.len(), 3);
        assert_eq!(magnets[0].size, "2.1GB");
        assert_eq!(magnets[1].size, SIZE_UNKNOWN);
        assert_eq!(magnets[2].size, SIZE_UNKNOWN);
        assert_eq!(magnets[2].magnet, "magnet:?xt=urn:btih:ccc333");
    }

    #[test]
    fn magnets_absent_is_empty() {
        assert!(parse_magnets("<html><p>登入後可見</p></html>").is_empty());
    }

    #[test]
    fn info_hash_preserves_case() {
        assert_eq!(
            extract_info_hash("magnet:?xt=urn:btih:ABCDEF0123456789abcdef&dn=x").as_deref(),
            Some("ABCDEF0123456789abcdef")
        );
        assert_eq!(
            extract_info_hash("MAGNET:?XT=URN:BTIH:00FF").as_deref(),
            Some("00FF")
        );
        assert_eq!(extract_info_hash("magnet:?xt=urn:sha1:zzz"), None);
    }

    #[test]
    fn search_url_encodes_keyword() {
        let catalog = Catalog::new(FakeTransport::new(), "https://javdb.com/");
        assert_eq!(
            catalog.search_url("三上 悠亜"),
            "https://javdb.com/search?q=%E4%B8%89%E4%B8%8A%20%E6%82%A0%E4%BA%9C&f=all"
        );
    }

    #[tokio::test]
    async fn magnets_for_code_follows_first_result() {
        let search = search_page(&[
            card("/v/first", "ABC-123", "hit", "2024-01-01"),
            card("/v/second", "ABC-1234", "other", "2024-01-02"),
        ]);
        let detail = detail_page(&magnet_row("cafe01", "3.3GB"));
        let transport = Arc::new(
            FakeTransport::new()
                .page("https://javdb.com/search?q=ABC-123&f=all", &search)
                .page("https://javdb.com/v/first", &detail),
        );
        let catalog = Catalog::new(Arc::clone(&transport), BASE);
        let magnets = catalog.magnets_for_code("ABC-123").await.unwrap();
        assert_eq!(magnets.len(), 1);
        assert_eq!(magnets[0].size, "3.3GB");
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn magnets_for_unknown_code_is_empty_not_error() {
        let transport = FakeTransport::new().page("https://javdb.com/search?q=NOPE-000&f=all", &search_page(&[]));
        let catalog = Catalog::new(transport, BASE);
        assert!(catalog.magnets_for_code("NOPE-000").await.unwrap().is_empty());
        assert_eq!(catalog.lookup_magnets("NOPE-000").await.unwrap(), MagnetLookup::CodeNotFound);
    }

    #[tokio::test]
    async fn unknown_code_differs_from_page_without_magnets() {
        let search = search_page(&[card("/v/bare", "ABC-123", "hit", "2024-01-01")]);
        let transport = FakeTransport::new()
            .page("https://javdb.com/search?q=ABC-123&f=all", &search)
            .page("https://javdb.com/v/bare", &detail_page("<p>登入後可見</p>"));
        let catalog = Catalog::new(transport, BASE);
        assert_eq!(
            catalog.lookup_magnets("ABC-123").await.unwrap(),
            MagnetLookup::Found {
                detail_url: "https://javdb.com/v/bare".into(),
                magnets: vec![],
            }
        );
    }

    #[tokio::test]
    async fn search_failure_is_distinct_from_empty() {
        let catalog = Catalog::new(FakeTransport::new(), BASE);
        assert!(catalog.search("ABC-123", 10).await.is_err());
    }
}
