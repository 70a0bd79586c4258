// src/source/mod.rs
//! Content source seam: listing an account's posts and pulling a post's media to disk.

pub mod http;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::MediaKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteMedia {
    pub url: String,
    pub kind: MediaKind,
}

/// A post as reported by the content source, before it is stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemotePost {
    pub shortcode: String,
    pub taken_at: DateTime<Utc>,
    #[serde(default)]
    pub caption: Option<String>,
    /// e.g. "GraphImage" | "GraphVideo" | "GraphSidecar"
    pub typename: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub media: Vec<RemoteMedia>,
}

#[derive(Debug, Error)]
pub enum SourceError {
    /// Connection resets, timeouts, 5xx, rate limiting. Worth another attempt.
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("account not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        let transient = e.is_timeout()
            || e.is_connect()
            || e.is_request()
            || e.status()
                .map(|s| s.is_server_error() || s.as_u16() == 429)
                .unwrap_or(false);
        if transient {
            Self::Transient(e.to_string())
        } else {
            Self::Other(anyhow::Error::new(e))
        }
    }
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Full post listing for `handle`, in whatever order the source returns it.
    async fn fetch_account_posts(&self, handle: &str) -> Result<Vec<RemotePost>, SourceError>;

    /// Write every media file of `post` into `target_dir` (which already exists).
    async fn download_post_media(
        &self,
        post: &RemotePost,
        target_dir: &Path,
    ) -> Result<(), SourceError>;

    fn name(&self) -> &'static str;
}
