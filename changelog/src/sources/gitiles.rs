//! Gitiles commit log client.
//!
//! Pages through `+log/{revision}` lazily, following the `next` cursor of
//! each page. Requests are spaced by a minimum interval.

use chrono::{DateTime, NaiveDateTime};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::chromestatus::parse_guarded;
use super::{CommitDetail, CommitLogSource, LogOptions};
use crate::error::{ClogError, ClogResult};
use crate::model::Signature;

pub const DEFAULT_REPO_URL: &str = "https://chromium.googlesource.com/v8/v8.git";

/// Largest page requested from gitiles
const MAX_PAGE_SIZE: usize = 1000;

/// Spaces requests at least `min_interval` apart
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct LogPage {
    #[serde(default)]
    log: Vec<GitilesCommit>,
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitilesCommit {
    commit: String,
    #[serde(default)]
    parents: Vec<String>,
    author: GitilesPerson,
    committer: GitilesPerson,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GitilesPerson {
    name: String,
    email: String,
    time: String,
}

impl From<GitilesPerson> for Signature {
    fn from(person: GitilesPerson) -> Self {
        Signature {
            date: to_iso8601(&person.time),
            name: person.name,
            email: person.email,
        }
    }
}

impl From<GitilesCommit> for CommitDetail {
    fn from(commit: GitilesCommit) -> Self {
        CommitDetail {
            commit: commit.commit,
            author: commit.author.into(),
            committer: commit.committer.into(),
            message: commit.message,
        }
    }
}

/// Gitiles renders times as `Tue Jun 06 10:46:47 2023`, optionally with an
/// offset. Anything unparseable is kept verbatim.
fn to_iso8601(time: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_str(time, "%a %b %d %H:%M:%S %Y %z") {
        return dt.to_rfc3339();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(time, "%a %b %d %H:%M:%S %Y") {
        return naive.and_utc().to_rfc3339();
    }
    time.to_string()
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Gitiles client for one repository
pub struct GitilesClient {
    http_client: reqwest::Client,
    repo_url: String,
    rate_limiter: Arc<RateLimiter>,
}

impl GitilesClient {
    pub fn new(repo_url: impl Into<String>, min_interval: Duration) -> ClogResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http_client,
            repo_url: repo_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::new(min_interval)),
        })
    }

    fn log_url(&self, revision: &str, path_filter: Option<&str>) -> String {
        match path_filter {
            Some(path) => format!(
                "{}/+log/{}/{}",
                self.repo_url,
                revision,
                path.trim_matches('/')
            ),
            None => format!("{}/+log/{}", self.repo_url, revision),
        }
    }

    async fn fetch_page(&self, url: &str, page_size: usize, start: Option<&str>) -> ClogResult<LogPage> {
        self.rate_limiter.wait().await;

        let mut query = vec![("format", "JSON".to_string()), ("n", page_size.to_string())];
        if let Some(start) = start {
            query.push(("s", start.to_string()));
        }

        tracing::debug!(url = %url, start = ?start, "Fetching gitiles log page");
        let response = self.http_client.get(url).query(&query).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(ClogError::upstream(format!(
                "gitiles {} returned {}",
                url, status
            )));
        }

        let text = response.text().await?;
        parse_guarded(&text)
    }
}

impl CommitLogSource for GitilesClient {
    fn get_logs<'a>(
        &'a self,
        revision: &str,
        options: &LogOptions,
    ) -> BoxStream<'a, ClogResult<CommitDetail>> {
        let url = self.log_url(revision, options.path_filter.as_deref());
        let limit = options.limit;
        let no_merges = options.no_merges;
        let page_size = limit.clamp(1, MAX_PAGE_SIZE);

        stream::try_unfold(Cursor::Start, move |cursor| {
            let url = url.clone();
            async move {
                let start = match cursor {
                    Cursor::Done => return Ok(None),
                    Cursor::Start => None,
                    Cursor::Next(start) => Some(start),
                };

                let page = self.fetch_page(&url, page_size, start.as_deref()).await?;
                let next = page.next.map_or(Cursor::Done, Cursor::Next);
                Ok::<_, ClogError>(Some((page.log, next)))
            }
        })
        .map_ok(move |log| {
            stream::iter(
                log.into_iter()
                    .filter(move |commit| !no_merges || commit.parents.len() <= 1)
                    .map(|commit| Ok(CommitDetail::from(commit))),
            )
        })
        .try_flatten()
        .take(limit)
        .boxed()
    }
}
