use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::Config;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of fetching one title. `wikitext` is `None` for missing pages
/// and failed requests; `error` tells the two apart.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub title: String,
    pub wikitext: Option<String>,
    pub error: Option<String>,
    pub latency_ms: u64,
}

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub missing: usize,
    pub errors: usize,
}

impl FetchStats {
    pub fn from_pages(pages: &[FetchedPage]) -> Self {
        let errors = pages.iter().filter(|p| p.error.is_some()).count();
        let ok = pages.iter().filter(|p| p.wikitext.is_some()).count();
        Self {
            total: pages.len(),
            ok,
            missing: pages.len() - ok - errors,
            errors,
        }
    }
}

/// MediaWiki API client (`action=query&prop=revisions`).
#[derive(Debug, Clone)]
pub struct WikiClient {
    http: reqwest::Client,
    api_url: String,
    concurrency: usize,
}

impl WikiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            api_url: config.wiki_url.clone(),
            concurrency: config.concurrency.max(1),
        })
    }

    /// Current wikitext of `title`, or `None` if the page does not exist.
    /// Rate limits, server errors and transport failures are retried with
    /// exponential backoff.
    pub async fn fetch_wikitext(&self, title: &str) -> Result<Option<String>> {
        let mut attempt = 0;
        loop {
            match self.query_revision(title).await {
                Ok(value) => return Ok(parse_revision_content(&value)),
                Err(e) if attempt < MAX_RETRIES && should_retry(&format!("{e:#}")) => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Request for {} failed (attempt {}/{}), backing off {:.1}s: {:#}",
                        title,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch many titles concurrently. Results keep the input order;
    /// per-page failures are recorded on the page, not returned as errors.
    pub async fn fetch_many(&self, titles: &[String]) -> Result<Vec<FetchedPage>> {
        let total = titles.len();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );

        // Workers send (input index, page); the receiver slots them back in order.
        let (tx, mut rx) = tokio::sync::mpsc::channel::<(usize, FetchedPage)>(self.concurrency * 2);

        for (index, title) in titles.iter().cloned().enumerate() {
            let client = self.clone();
            let sem = Arc::clone(&semaphore);
            let tx = tx.clone();

            tokio::spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return;
                };
                let page = client.fetch_page(title).await;
                let _ = tx.send((index, page)).await;
            });
        }

        // Drop our copy of tx so rx closes when all spawned tasks finish
        drop(tx);

        let mut slots: Vec<Option<FetchedPage>> = vec![None; total];
        while let Some((index, page)) = rx.recv().await {
            slots[index] = Some(page);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let pages: Vec<FetchedPage> = slots
            .into_iter()
            .zip(titles)
            .map(|(slot, title)| {
                slot.unwrap_or_else(|| FetchedPage {
                    title: title.clone(),
                    wikitext: None,
                    error: Some("fetch task did not complete".to_string()),
                    latency_ms: 0,
                })
            })
            .collect();

        let stats = FetchStats::from_pages(&pages);
        info!(
            "Fetched {} pages ({} ok, {} missing, {} errors)",
            stats.total, stats.ok, stats.missing, stats.errors
        );
        Ok(pages)
    }

    async fn fetch_page(&self, title: String) -> FetchedPage {
        let start = Instant::now();
        let result = self.fetch_wikitext(&title).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(wikitext) => {
                if wikitext.is_none() {
                    warn!("Page not found: {}", title);
                } else {
                    debug!("Fetched {} in {}ms", title, latency_ms);
                }
                FetchedPage {
                    title,
                    wikitext,
                    error: None,
                    latency_ms,
                }
            }
            Err(e) => {
                warn!("Fetch failed for {}: {:#}", title, e);
                FetchedPage {
                    title,
                    wikitext: None,
                    error: Some(format!("{e:#}")),
                    latency_ms,
                }
            }
        }
    }

    async fn query_revision(&self, title: &str) -> Result<Value> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "revisions"),
                ("rvprop", "content"),
                ("rvslots", "main"),
                ("redirects", "1"),
                ("formatversion", "2"),
                ("format", "json"),
                ("origin", "*"),
            ])
            .send()
            .await
            .with_context(|| format!("Request for {title} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status.as_u16(), title);
        }
        response
            .json::<Value>()
            .await
            .with_context(|| format!("Invalid JSON response for {title}"))
    }
}

/// Pull the main-slot wikitext out of a `formatversion=2` revisions
/// response. Older servers without slots put `content` on the revision.
pub fn parse_revision_content(value: &Value) -> Option<String> {
    let page = value.pointer("/query/pages/0")?;
    if page.get("missing").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let revision = page.pointer("/revisions/0")?;
    revision
        .pointer("/slots/main/content")
        .or_else(|| revision.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn should_retry(message: &str) -> bool {
    const RETRYABLE: &[&str] = &[
        "HTTP 429",
        "HTTP 500",
        "HTTP 502",
        "HTTP 503",
        "HTTP 504",
        "timed out",
        "error sending request",
    ];
    RETRYABLE.iter().any(|marker| message.contains(marker))
}

// ── Tests ──
