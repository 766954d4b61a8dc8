//! Page fetching and text extraction.
//!
//! Browser-internal and private/confidential URLs are refused before any
//! network call. Fetch failures are reported as unindexable pages, never as
//! errors: the ingestion loop just moves on.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html};
use url::Url;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sites whose pages are personal (mail, chat, office suites).
const PRIVATE_SITES: &[&str] = &[
    "gmail.com",
    "google.com/mail",
    "whatsapp.com",
    "web.whatsapp.com",
    "facebook.com/messages",
    "linkedin.com/messaging",
    "outlook.com",
    "office.com",
    "slack.com",
    "teams.microsoft.com",
];

/// Elements whose text is never page content.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: String,
    pub title: String,
    pub text: String,
    pub indexable: bool,
    pub skip_reason: Option<String>,
}

impl FetchedPage {
    pub fn skipped(url: &str, title: &str, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            title: title.to_string(),
            text: String::new(),
            indexable: false,
            skip_reason: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchedPage;
}

pub fn is_browser_internal(url: &str) -> bool {
    url.starts_with("chrome://") || url.starts_with("chrome-extension://")
}

/// Browser-internal pages and the personal sites above.
pub fn is_private_url(url: &str) -> bool {
    if is_browser_internal(url) {
        return true;
    }
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let location = format!("{host}{}", parsed.path().to_lowercase());
    PRIVATE_SITES.iter().any(|site| location.contains(site))
}

/// Why `url` must not be fetched, if it must not.
pub fn refusal(url: &str) -> Option<(&'static str, &'static str)> {
    if is_browser_internal(url) {
        Some(("Chrome Internal Page", "Chrome internal URL"))
    } else if is_private_url(url) {
        Some(("", "Private/confidential website"))
    } else {
        None
    }
}

/// Fetches over HTTP with reqwest and strips markup.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mneme/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<String, reqwest::Error> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchedPage {
        if let Some((title, reason)) = refusal(url) {
            tracing::info!(url, reason, "not fetching");
            return FetchedPage::skipped(url, title, reason);
        }
        match self.get(url).await {
            Ok(html) => {
                let (title, text) = extract_text(&html);
                FetchedPage {
                    url: url.to_string(),
                    title,
                    text,
                    indexable: true,
                    skip_reason: None,
                }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "content extraction failed");
                FetchedPage::skipped(url, "", e.to_string())
            }
        }
    }
}

/// `(title, visible text)` of an HTML document, with whitespace collapsed.
/// Text inside `<script>`, `<style>` and `<noscript>` is dropped; comments
/// never reach the text and entities come out decoded.
pub fn extract_text(html: &str) -> (String, String) {
    let doc = Html::parse_document(html);
    let title = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "title")
        .map(|el| collapse_ws(&el.text().collect::<String>()))
        .unwrap_or_default();

    let mut text = String::with_capacity(html.len() / 2);
    for node in doc.root_element().descendants() {
        let Some(t) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            text.push_str(t);
            text.push(' ');
        }
    }
    (title, collapse_ws(&text))
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
