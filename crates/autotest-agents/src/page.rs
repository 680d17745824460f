//! Page-content service: URL in, page markup out.
//!
//! Only the `<body>` content is handed on, capped at a character budget.
//! The shipped fetcher is a plain HTTP GET; a browser-driven fetcher that
//! waits for client-side rendering can be plugged in through [`PageFetcher`].

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body.*?>(.*?)</body>").unwrap());

#[derive(Debug, Error)]
pub enum PageError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned an empty page")]
    Empty { url: String },
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch the full markup of `url`.
    async fn fetch(&self, url: &str) -> Result<String, PageError>;
}

/// [`PageFetcher`] over `reqwest`.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, PageError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("autotest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(PageError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, PageError> {
        let request_err = |source: reqwest::Error| PageError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let html = response.text().await.map_err(request_err)?;
        tracing::info!(url, bytes = html.len(), "page fetched");
        Ok(html)
    }
}

/// The inner content of the first `<body>` element, trimmed, or the whole
/// document when there is none.
pub fn extract_body_content(html: &str) -> &str {
    BODY.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(html)
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// Fetch `url` and reduce it to the excerpt used for script generation.
pub async fn fetch_excerpt(
    fetcher: &dyn PageFetcher,
    url: &str,
    max_chars: usize,
) -> Result<String, PageError> {
    let html = fetcher.fetch(url).await?;
    let body = extract_body_content(&html);
    if body.trim().is_empty() {
        return Err(PageError::Empty {
            url: url.to_string(),
        });
    }
    let excerpt = truncate_chars(body, max_chars);
    if excerpt.len() < body.len() {
        tracing::debug!(url, max_chars, "page excerpt truncated");
    }
    Ok(excerpt.to_string())
}
