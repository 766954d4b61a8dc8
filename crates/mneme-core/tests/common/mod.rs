//! Deterministic collaborators for tests: no network, no models.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mneme_core::fetch::{FetchedPage, Fetcher};
use mneme_core::planner::{PlanError, Planner};
use mneme_core::{EmbedError, Embedder, EngineOptions, MemoryDir, MemoryEngine};

pub const VOCAB: &[&str] = &[
    "rust", "borrow", "checker", "banana", "smoothie", "ocean", "whale", "python", "memory", "index",
];

/// One dimension per vocabulary word (occurrence count) plus a constant bias.
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split(|c: char| !c.is_alphanumeric()).collect();
    let mut v: Vec<f32> = VOCAB
        .iter()
        .map(|w| words.iter().filter(|x| *x == w).count() as f32)
        .collect();
    v.push(1.0);
    v
}

#[derive(Default)]
pub struct VocabEmbedder {
    pub calls: AtomicUsize,
    /// Texts containing this marker fail.
    pub fail_on: Option<String>,
}

impl VocabEmbedder {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(marker.to_string()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                return Err(EmbedError::Request("connection refused".into()));
            }
        }
        Ok(bag_of_words(text))
    }
}

/// Never answers within any reasonable timeout.
pub struct HangingEmbedder;

#[async_trait]
impl Embedder for HangingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![1.0])
    }
}

/// Returns a vector whose dimension is the number of words in the text.
pub struct RaggedEmbedder;

#[async_trait]
impl Embedder for RaggedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(vec![1.0; text.split_whitespace().count().max(1)])
    }
}

/// Serves canned pages; unknown URLs are unreachable.
pub struct StaticFetcher {
    pub pages: Vec<FetchedPage>,
}

impl StaticFetcher {
    pub fn page(url: &str, title: &str, text: &str) -> FetchedPage {
        FetchedPage {
            url: url.into(),
            title: title.into(),
            text: text.into(),
            indexable: true,
            skip_reason: None,
        }
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> FetchedPage {
        if let Some((title, reason)) = mneme_core::fetch::refusal(url) {
            return FetchedPage::skipped(url, title, reason);
        }
        self.pages
            .iter()
            .find(|p| p.url == url)
            .cloned()
            .unwrap_or_else(|| FetchedPage::skipped(url, "", "connection refused"))
    }
}

/// Replays a fixed answer and remembers the last prompt.
pub struct ScriptedPlanner {
    pub answer: String,
    pub last_prompt: std::sync::Mutex<String>,
}

impl ScriptedPlanner {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            last_prompt: std::sync::Mutex::new(String::new()),
        }
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, prompt: &str) -> Result<String, PlanError> {
        *self.last_prompt.lock().unwrap() = prompt.to_string();
        Ok(self.answer.clone())
    }
}

/// Always fails, as an unreachable model server would.
pub struct FailingPlanner;

#[async_trait]
impl Planner for FailingPlanner {
    async fn plan(&self, _prompt: &str) -> Result<String, PlanError> {
        Err(PlanError::Request("connection refused".into()))
    }
}

pub fn options() -> EngineOptions {
    EngineOptions {
        embed_timeout: Duration::from_millis(200),
        ..EngineOptions::default()
    }
}

pub fn open(dir: &std::path::Path, embedder: Arc<dyn Embedder>) -> MemoryEngine {
    MemoryEngine::open(MemoryDir::new(dir), embedder, options()).unwrap()
}
