use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::Settings;

const BASE_BACKOFF_MS: u64 = 2000;
const MAX_BACKOFF_MS: u64 = 120_000;
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// List-stage facts carried to the detail request for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchContext {
    pub expected_start_date: Option<NaiveDate>,
    pub item_id: Option<String>,
}

/// Which stage of the spider handles the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    List,
    Detail(FetchContext),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub body: Option<String>,
    pub headers: Vec<(String, String)>,
    pub callback: Callback,
}

impl Request {
    pub fn get(url: impl Into<String>, callback: Callback) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            headers: Vec::new(),
            callback,
        }
    }

    /// Form-encoded POST.
    pub fn post_form(url: impl Into<String>, body: impl Into<String>, callback: Callback) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            body: Some(body.into()),
            headers: vec![("Content-Type".into(), FORM_CONTENT_TYPE.into())],
            callback,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Random 15-digit integer for backends that cache by exact URL.
pub fn cache_buster() -> u64 {
    rand::thread_rng().gen_range(10u64.pow(14)..10u64.pow(15))
}

/// The outbound side of a crawl: one request in, one response out.
#[async_trait(?Send)]
pub trait Fetcher {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// reqwest-backed fetcher. Retries rate limits and 5xx with exponential backoff.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    async fn fetch_once(&self, request: &Request) -> Result<Response> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let start = Instant::now();
        let resp = builder.send().await?;
        let url = resp.url().to_string();
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        debug!(
            "{:?} {} -> {} in {}ms",
            request.method,
            request.url,
            status,
            start.elapsed().as_millis()
        );
        Ok(Response { url, status, body })
    }
}

/// Exponential, capped so large retry counts cannot overflow.
fn backoff(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt)
        .and_then(|f| BASE_BACKOFF_MS.checked_mul(f))
        .map_or(MAX_BACKOFF_MS, |ms| ms.min(MAX_BACKOFF_MS));
    Duration::from_millis(ms)
}

#[async_trait(?Send)]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        for attempt in 0..self.max_retries {
            let response = self.fetch_once(request).await?;
            let should_retry = response.status == 429 || response.status >= 500;
            if !should_retry {
                return Ok(response);
            }

            let delay = backoff(attempt);
            warn!(
                "HTTP {} on {} (attempt {}/{}), backing off {:.1}s",
                response.status,
                request.url,
                attempt + 1,
                self.max_retries,
                delay.as_secs_f64()
            );
            tokio::time::sleep(delay).await;
        }

        self.fetch_once(request)
            .await
            .with_context(|| format!("Failed to fetch {}", request.url))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Serves canned bodies to any request whose URL or form body contains a
    /// registered needle; the first matching route wins.
    /// Every request it sees is recorded for later assertions.
    #[derive(Default)]
    pub struct FixtureFetcher {
        routes: Vec<(String, u16, String)>,
        pub seen: std::cell::RefCell<Vec<Request>>,
    }

    impl FixtureFetcher {
        pub fn route(mut self, needle: &str, body: impl Into<String>) -> Self {
            self.routes.push((needle.to_string(), 200, body.into()));
            self
        }

        pub fn route_status(mut self, needle: &str, status: u16, body: impl Into<String>) -> Self {
            self.routes.push((needle.to_string(), status, body.into()));
            self
        }
    }

    #[async_trait(?Send)]
    impl Fetcher for FixtureFetcher {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.seen.borrow_mut().push(request.clone());
            let (_, status, body) = self
                .routes
                .iter()
                .find(|(needle, _, _)| {
                    request.url.contains(needle.as_str())
                        || request.body.as_deref().is_some_and(|b| b.contains(needle.as_str()))
                })
                .ok_or_else(|| anyhow::anyhow!("no fixture for {}", request.url))?;
            Ok(Response {
                url: request.url.clone(),
                status: *status,
                body: body.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_buster_has_15_digits() {
        for _ in 0..100 {
            let n = cache_buster();
            assert!((10u64.pow(14)..10u64.pow(15)).contains(&n));
            assert_eq!(n.to_string().len(), 15);
        }
    }

    #[test]
    fn post_form_sets_content_type() {
        let req = Request::post_form("https://example.com", "a=1", Callback::List);
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body.as_deref(), Some("a=1"));
        assert!(req
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == FORM_CONTENT_TYPE));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(0), Duration::from_millis(2000));
        assert_eq!(backoff(3), Duration::from_millis(16_000));
        assert_eq!(backoff(6), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff(53), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff(100), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn success_range() {
        let ok = Response { url: String::new(), status: 204, body: String::new() };
        let bad = Response { url: String::new(), status: 404, body: String::new() };
        assert!(ok.is_success());
        assert!(!bad.is_success());
    }
}
