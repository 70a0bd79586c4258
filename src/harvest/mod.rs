// src/harvest/mod.rs
//! Harvest engine: list each tracked account, keep posts inside the trailing
//! window, download them with bounded jittered retries, persist metadata.
//!
//! Everything here is sequential on purpose (one account, one post, one attempt
//! at a time) so the request rate against the source stays predictable.

pub mod retry;
pub mod scheduler;
pub mod window;

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::rng::SharedRng;
use crate::source::{ContentSource, RemotePost, SourceError};
use crate::storage::{MetadataRecord, Storage};

pub use retry::RetryPolicy;
pub use window::HarvestWindow;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "harvest_download_attempts_total",
            "Post download attempts, retries included."
        );
        describe_counter!(
            "harvest_posts_downloaded_total",
            "Posts fully stored (media + metadata)."
        );
        describe_counter!(
            "harvest_posts_failed_total",
            "Posts given up on after retries or a write failure."
        );
        describe_counter!(
            "harvest_account_errors_total",
            "Accounts skipped because listing failed."
        );
        describe_gauge!(
            "harvest_last_run_ts",
            "Unix ts when the last harvest run finished."
        );
    });
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("transient network failure: {0}")]
    TransientNetwork(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("content write failed for post {post_id}")]
    ContentWrite {
        post_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("content source failure")]
    Source(#[source] anyhow::Error),
}

impl HarvestError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }

    fn from_listing(account: &str, e: SourceError) -> Self {
        match e {
            SourceError::Transient(m) => Self::TransientNetwork(m),
            SourceError::NotFound(_) => Self::AccountNotFound(account.to_string()),
            SourceError::Other(err) => Self::Source(err),
        }
    }

    fn from_download(post_id: &str, e: SourceError) -> Self {
        match e {
            SourceError::Transient(m) => Self::TransientNetwork(m),
            other => Self::ContentWrite {
                post_id: post_id.to_string(),
                source: anyhow::Error::new(other),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    pub account: String,
    pub examined: usize,
    pub in_window: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Set when the account was skipped entirely.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestReport {
    pub window: HarvestWindow,
    pub accounts: Vec<AccountReport>,
}

impl HarvestReport {
    pub fn downloaded(&self) -> usize {
        self.accounts.iter().map(|a| a.downloaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.accounts.iter().map(|a| a.failed).sum()
    }
}

pub struct Harvester {
    storage: Storage,
    source: Arc<dyn ContentSource>,
    policy: RetryPolicy,
    rng: SharedRng,
}

impl Harvester {
    pub fn new(
        storage: Storage,
        source: Arc<dyn ContentSource>,
        policy: RetryPolicy,
        rng: SharedRng,
    ) -> Self {
        Self {
            storage,
            source,
            policy,
            rng,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Harvest every account against one window ending now. Best-effort: an
    /// account that fails is logged and the next one is processed.
    pub async fn harvest(&self, accounts: &[String], window_hours: i64) -> HarvestReport {
        self.harvest_at(Utc::now(), accounts, window_hours).await
    }

    /// Same as [`Harvester::harvest`] with an explicit "now".
    pub async fn harvest_at(
        &self,
        now: DateTime<Utc>,
        accounts: &[String],
        window_hours: i64,
    ) -> HarvestReport {
        ensure_metrics_described();
        let window = HarvestWindow::trailing(now, window_hours);
        info!(
            target: "harvest",
            source = self.source.name(),
            since = %window.since,
            until = %window.until,
            accounts = accounts.len(),
            "downloading posts (UTC window)"
        );

        let mut reports = Vec::with_capacity(accounts.len());
        for account in accounts {
            let report = match self.harvest_account(account, &window).await {
                Ok(r) => r,
                Err(e) => {
                    error!(target: "harvest", account = %account, error = ?e, "error processing account");
                    counter!("harvest_account_errors_total").increment(1);
                    AccountReport {
                        account: account.clone(),
                        error: Some(e.to_string()),
                        ..AccountReport::default()
                    }
                }
            };
            reports.push(report);
        }

        gauge!("harvest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        HarvestReport {
            window,
            accounts: reports,
        }
    }

    async fn harvest_account(
        &self,
        account: &str,
        window: &HarvestWindow,
    ) -> Result<AccountReport, HarvestError> {
        info!(target: "harvest", account, "processing account");
        self.pause(&self.policy.account_delay).await;

        let mut posts = self
            .source
            .fetch_account_posts(account)
            .await
            .map_err(|e| HarvestError::from_listing(account, e))?;
        posts.sort_by(|a, b| b.taken_at.cmp(&a.taken_at));
        debug!(target: "harvest", account, posts = posts.len(), "collected and sorted posts");

        let mut report = AccountReport {
            account: account.to_string(),
            examined: posts.len(),
            ..AccountReport::default()
        };

        for post in &posts {
            if !window.contains(post.taken_at) {
                debug!(
                    target: "harvest",
                    post = %post.shortcode,
                    taken_at = %post.taken_at,
                    "skipping post outside time range"
                );
                continue;
            }
            report.in_window += 1;
            info!(target: "harvest", account, post = %post.shortcode, "attempting download");
            match self.download_with_retry(account, post).await {
                Ok(()) => report.downloaded += 1,
                Err(e) => {
                    warn!(target: "harvest", post = %post.shortcode, error = %e, "skipped incomplete post");
                    report.failed += 1;
                }
            }
        }

        info!(target: "harvest", account, downloaded = report.downloaded, "account done");
        if report.downloaded == 0 {
            warn!(target: "harvest", account, "no posts found in the specified time range");
        }
        Ok(report)
    }

    /// Up to `max_attempts` tries. Only transient network failures are retried;
    /// anything else fails the post straight away.
    pub async fn download_with_retry(
        &self,
        account: &str,
        post: &RemotePost,
    ) -> Result<(), HarvestError> {
        let max = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.pause(&self.policy.pre_attempt_delay).await;
            counter!("harvest_download_attempts_total").increment(1);

            match self.download_post_completely(account, post).await {
                Ok(()) => {
                    counter!("harvest_posts_downloaded_total").increment(1);
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < max => {
                    warn!(target: "harvest", post = %post.shortcode, attempt, error = %e, "request failed, will retry");
                    self.pause(&self.policy.backoff_delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(target: "harvest", post = %post.shortcode, attempt, "max retries reached");
                    }
                    counter!("harvest_posts_failed_total").increment(1);
                    return Err(e);
                }
            }
        }
    }

    /// Media first, then the metadata record. On any failure the post directory
    /// is removed so no post is ever left without its metadata.
    pub async fn download_post_completely(
        &self,
        account: &str,
        post: &RemotePost,
    ) -> Result<(), HarvestError> {
        let dir = self
            .storage
            .create_post_dir(account, &post.shortcode)
            .map_err(|e| HarvestError::ContentWrite {
                post_id: post.shortcode.clone(),
                source: anyhow::Error::new(e),
            })?;

        let result = async {
            self.source
                .download_post_media(post, &dir)
                .await
                .map_err(|e| HarvestError::from_download(&post.shortcode, e))?;
            let record = metadata_for(account, post);
            self.storage
                .write_metadata(&dir, &record)
                .map_err(|e| HarvestError::ContentWrite {
                    post_id: post.shortcode.clone(),
                    source: anyhow::Error::new(e),
                })?;
            Ok::<(), HarvestError>(())
        }
        .await;

        match result {
            Ok(()) => {
                info!(target: "harvest", post = %post.shortcode, "successfully downloaded post");
                Ok(())
            }
            Err(e) => {
                error!(target: "harvest", post = %post.shortcode, error = %e, "error downloading post");
                self.storage.delete_post_dir(account, &post.shortcode);
                Err(e)
            }
        }
    }

    async fn pause(&self, range: &RangeInclusive<Duration>) {
        let d = self.rng.jitter(range);
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

pub fn metadata_for(account: &str, post: &RemotePost) -> MetadataRecord {
    MetadataRecord {
        id: post.shortcode.clone(),
        username: account.to_string(),
        timestamp: post.taken_at,
        caption: post.caption.clone(),
        media_type: post.typename.clone(),
        likes: post.likes,
        comments: post.comments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_errors_map_to_taxonomy() {
        assert!(matches!(
            HarvestError::from_listing("a", SourceError::NotFound("a".into())),
            HarvestError::AccountNotFound(_)
        ));
        assert!(HarvestError::from_listing("a", SourceError::Transient("x".into())).is_transient());
    }

    #[test]
    fn non_transient_download_errors_become_content_write() {
        let e = HarvestError::from_download("p1", SourceError::NotFound("gone".into()));
        assert!(matches!(e, HarvestError::ContentWrite { ref post_id, .. } if post_id == "p1"));
        assert!(!e.is_transient());
    }
}
