//! HTTP side of the harvest: browser-profile requests against the search
//! endpoint, the page-count probe, and the paced page-by-page fetch loop.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, CONNECTION, HOST, REFERER,
    UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, error, warn};

use crate::category::SearchCategory;
use crate::extract;

pub const BASE_URL: &str = "https://browser.geekbench.com/search";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Cooldown before re-issuing a rate-limited or server-errored request.
const RETRY_COOLDOWN: Duration = Duration::from_secs(5);

const USER_AGENT_VALUE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36";

/// Query-string parameters for one search page.
pub fn search_params(category: SearchCategory, query: &str, page: u32) -> Vec<(&'static str, String)> {
    vec![
        ("k", category.search_key().to_string()),
        ("page", page.to_string()),
        ("q", query.to_string()),
        ("utf8", "✓".to_string()),
    ]
}

/// Full request URL including the encoded query string. Doubles as the
/// Referer of the request itself, matching how a browser pages through
/// the listing.
pub fn request_url(params: &[(&'static str, String)]) -> Result<Url> {
    Url::parse_with_params(BASE_URL, params).context("failed to build search URL")
}

// The header set a desktop Chrome sends for a top-level navigation. Built
// fresh per request; nothing here is process-global.
fn browser_headers(referer: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("dnt", HeaderValue::from_static("1"));
    headers.insert(HOST, HeaderValue::from_static("browser.geekbench.com"));
    headers.insert(
        REFERER,
        HeaderValue::from_str(referer).context("invalid referer value")?,
    );
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(r#""Not(A:Brand";v="99", "Google Chrome";v="133", "Chromium";v="133""#),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static(r#""Windows""#));
    Ok(headers)
}

fn session() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// One GET against the search endpoint.
///
/// 429/500/503 re-issue the same request after a fixed cooldown, with no
/// retry ceiling. Any other failure, transport errors included, logs and
/// returns `None`; callers treat such a page as empty and move on.
pub async fn fetch(
    client: &Client,
    params: &[(&'static str, String)],
    referer: &str,
) -> Result<Option<String>> {
    loop {
        let headers = browser_headers(referer)?;
        let response = match client.get(BASE_URL).query(params).headers(headers).send().await {
            Ok(response) => response,
            Err(err) => {
                error!("request failed for {BASE_URL}: {err:#}");
                return Ok(None);
            }
        };

        let status = response.status();
        if status.is_success() {
            let body = response.text().await.context("failed to read response body")?;
            return Ok(Some(body));
        }

        if matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::SERVICE_UNAVAILABLE
        ) {
            warn!(
                "received {status}, waiting {}s before retrying",
                RETRY_COOLDOWN.as_secs()
            );
            tokio::time::sleep(RETRY_COOLDOWN).await;
            continue;
        }

        error!("received status {status} for {referer}");
        return Ok(None);
    }
}

/// Probe page 1 for the pagination widget and report the remote page
/// count. Falls back to `default_pages` when the request yields nothing
/// or the widget is absent; `add_pages` is the top-up safety margin.
pub async fn fetch_page_count(
    category: SearchCategory,
    query: &str,
    default_pages: u32,
    add_pages: Option<u32>,
) -> Result<u32> {
    let client = session()?;
    let params = search_params(category, query, 1);
    let referer = request_url(&params)?;
    let body = fetch(&client, &params, referer.as_str()).await?;
    let total = body
        .as_deref()
        .and_then(extract::parse_last_page)
        .unwrap_or(default_pages);
    Ok(match add_pages {
        Some(margin) => total + margin,
        None => total,
    })
}

/// What one iteration of the fetch loop hands back: the raw page (absent
/// when the request failed non-retryably), plus the pacing delay and the
/// page count the remote reported on this page. The latter two are for
/// progress reporting only.
#[derive(Debug)]
pub struct PageYield {
    pub body: Option<String>,
    pub page: u32,
    pub remote_last_page: Option<u32>,
    pub delay: Duration,
}

/// Pages through one query's results strictly in order, one request in
/// flight, sleeping a uniform random delay between pages. Single pass:
/// once the inclusive bound is passed or the end-of-results notice
/// appears, the pager is exhausted.
pub struct SearchPager {
    client: Client,
    category: SearchCategory,
    query: String,
    current: u32,
    last: u32,
    min_delay: f64,
    max_delay: f64,
    pending_delay: Option<Duration>,
    done: bool,
}

impl SearchPager {
    pub fn new(
        category: SearchCategory,
        query: &str,
        start_page: u32,
        last_page: u32,
        min_delay: f64,
        max_delay: f64,
    ) -> Result<Self> {
        Ok(Self {
            client: session()?,
            category,
            query: query.to_string(),
            current: start_page,
            last: last_page,
            min_delay,
            max_delay,
            pending_delay: None,
            done: false,
        })
    }

    /// Fetch the next page, or `None` when the loop is over. The delay for
    /// a yielded page is slept at the start of the following call, so the
    /// caller sees each page as soon as it arrives.
    pub async fn next_page(&mut self) -> Result<Option<PageYield>> {
        if let Some(delay) = self.pending_delay.take() {
            tokio::time::sleep(delay).await;
        }
        if self.done || self.current > self.last {
            return Ok(None);
        }

        let page = self.current;
        let params = search_params(self.category, &self.query, page);
        let referer = request_url(&params)?;
        debug!(query = %self.query, page, "fetching search page");
        let body = fetch(&self.client, &params, referer.as_str()).await?;

        if let Some(text) = body.as_deref() {
            if extract::is_final_page(text) {
                self.done = true;
                return Ok(None);
            }
        }

        let remote_last_page = body.as_deref().and_then(extract::parse_last_page);
        let delay = self.draw_delay();
        self.pending_delay = Some(delay);
        self.current += 1;
        Ok(Some(PageYield { body, page, remote_last_page, delay }))
    }

    fn draw_delay(&self) -> Duration {
        let span = (self.max_delay - self.min_delay).max(0.0);
        Duration::from_secs_f64(self.min_delay + fastrand::f64() * span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_carry_category_key() {
        let params = search_params(SearchCategory::Gpu, "m3 max", 4);
        assert_eq!(params[0], ("k", "v6_compute".to_string()));
        assert_eq!(params[1], ("page", "4".to_string()));
        assert_eq!(params[2], ("q", "m3 max".to_string()));
        assert_eq!(params[3], ("utf8", "✓".to_string()));
    }

    #[test]
    fn request_url_encodes_query_string() {
        let url = request_url(&search_params(SearchCategory::Cpu, "samsung exynos", 2)).unwrap();
        let text = url.as_str();
        assert!(text.starts_with("https://browser.geekbench.com/search?"));
        assert!(text.contains("k=v6_cpu"));
        assert!(text.contains("page=2"));
        assert!(text.contains("utf8=%E2%9C%93"));
    }

    #[test]
    fn headers_thread_the_referer() {
        let headers = browser_headers("https://browser.geekbench.com/search?k=v6_cpu").unwrap();
        assert_eq!(
            headers.get(REFERER).unwrap().to_str().unwrap(),
            "https://browser.geekbench.com/search?k=v6_cpu"
        );
        assert!(headers.get(USER_AGENT).is_some());
        assert_eq!(headers.get("sec-fetch-mode").unwrap().to_str().unwrap(), "navigate");
    }

    #[tokio::test]
    async fn empty_page_range_fetches_nothing() {
        // last page below the start page: exhausted before any request.
        let mut pager = SearchPager::new(SearchCategory::Cpu, "q", 1, 0, 0.0, 0.0).unwrap();
        assert!(pager.next_page().await.unwrap().is_none());
        assert!(pager.next_page().await.unwrap().is_none());
    }
}
