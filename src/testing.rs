// src/testing.rs
//! Scriptable stand-ins for the external capabilities. Used by the integration
//! tests and handy for running the service without network access.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::caption::TextGenerator;
use crate::host::{direct_download_url, ObjectHost};
use crate::media::{MediaKind, MediaTransformer};
use crate::source::http::media_file_name;
use crate::source::{ContentSource, RemoteMedia, RemotePost, SourceError};

/// Build a post with `kinds.len()` media items.
pub fn post(shortcode: &str, taken_at: DateTime<Utc>, kinds: &[MediaKind]) -> RemotePost {
    RemotePost {
        shortcode: shortcode.to_string(),
        taken_at,
        caption: Some(format!("caption of {shortcode}")),
        typename: match kinds {
            [MediaKind::Video] => "GraphVideo",
            [_] => "GraphImage",
            _ => "GraphSidecar",
        }
        .to_string(),
        likes: 10,
        comments: 2,
        media: kinds
            .iter()
            .enumerate()
            .map(|(i, k)| RemoteMedia {
                url: format!("https://cdn.example/{shortcode}/{i}"),
                kind: *k,
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFailure {
    /// Every attempt fails with a transient network error.
    AlwaysTransient,
    /// The first `n` attempts fail transiently, then it succeeds.
    TransientTimes(usize),
    /// Writes the first media file, then fails with a non-network error.
    WriteFailsMidway,
}

/// In-memory content source with per-post failure injection.
#[derive(Default)]
pub struct ScriptedSource {
    accounts: HashMap<String, Vec<RemotePost>>,
    transient_listing: HashSet<String>,
    failures: HashMap<String, DownloadFailure>,
    listing_delay: Duration,
    attempts: Mutex<HashMap<String, usize>>,
    listings: Mutex<Vec<String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, handle: &str, posts: Vec<RemotePost>) -> Self {
        self.accounts.insert(handle.to_string(), posts);
        self
    }

    pub fn with_listing_outage(mut self, handle: &str) -> Self {
        self.transient_listing.insert(handle.to_string());
        self
    }

    /// Every listing call takes this long (tokio time).
    pub fn with_listing_delay(mut self, delay: Duration) -> Self {
        self.listing_delay = delay;
        self
    }

    pub fn with_failure(mut self, shortcode: &str, failure: DownloadFailure) -> Self {
        self.failures.insert(shortcode.to_string(), failure);
        self
    }

    /// Download attempts made so far for `shortcode`.
    pub fn attempts(&self, shortcode: &str) -> usize {
        let g = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        g.get(shortcode).copied().unwrap_or(0)
    }

    /// Accounts listed so far, in call order.
    pub fn listings(&self) -> Vec<String> {
        self.listings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn bump(&self, shortcode: &str) -> usize {
        let mut g = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let n = g.entry(shortcode.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn fetch_account_posts(&self, handle: &str) -> Result<Vec<RemotePost>, SourceError> {
        self.listings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.to_string());
        if !self.listing_delay.is_zero() {
            tokio::time::sleep(self.listing_delay).await;
        }
        if self.transient_listing.contains(handle) {
            return Err(SourceError::Transient(format!("{handle}: connection reset")));
        }
        self.accounts
            .get(handle)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(handle.to_string()))
    }

    async fn download_post_media(
        &self,
        post: &RemotePost,
        target_dir: &Path,
    ) -> Result<(), SourceError> {
        let attempt = self.bump(&post.shortcode);
        match self.failures.get(&post.shortcode) {
            Some(DownloadFailure::AlwaysTransient) => {
                return Err(SourceError::Transient("timed out".into()));
            }
            Some(DownloadFailure::TransientTimes(n)) if attempt <= *n => {
                return Err(SourceError::Transient("timed out".into()));
            }
            Some(DownloadFailure::WriteFailsMidway) => {
                if let Some(name) = media_file_name(post, 0) {
                    std::fs::write(target_dir.join(name), b"partial")
                        .map_err(|e| SourceError::Other(e.into()))?;
                }
                return Err(SourceError::Other(anyhow!("disk full")));
            }
            _ => {}
        }
        for i in 0..post.media.len() {
            if let Some(name) = media_file_name(post, i) {
                std::fs::write(target_dir.join(name), b"media")
                    .map_err(|e| SourceError::Other(e.into()))?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Copies input to output instead of compositing; fails for chosen file names.
pub struct CopyTransformer {
    pub frame: (u32, u32),
    fail_names: HashSet<String>,
    video_positions: Mutex<Vec<(u32, u32)>>,
}

impl CopyTransformer {
    pub fn new(frame: (u32, u32)) -> Self {
        Self {
            frame,
            fail_names: HashSet::new(),
            video_positions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_names.insert(file_name.to_string());
        self
    }

    pub fn video_positions(&self) -> Vec<(u32, u32)> {
        self.video_positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn copy(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_names.contains(&name) {
            bail!("decoder error on {name}");
        }
        std::fs::copy(input, output)?;
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl MediaTransformer for CopyTransformer {
    async fn watermark_image(&self, input: &Path, _logo: &Path, output: &Path) -> Result<PathBuf> {
        self.copy(input, output)
    }

    async fn probe_dimensions(&self, _input: &Path) -> Result<(u32, u32)> {
        Ok(self.frame)
    }

    async fn watermark_video(
        &self,
        input: &Path,
        _logo: &Path,
        output: &Path,
        position: (u32, u32),
    ) -> Result<PathBuf> {
        self.video_positions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(position);
        self.copy(input, output)
    }
}

/// Hands out tmpfiles-style URLs; fails for chosen file names.
#[derive(Default)]
pub struct ScriptedHost {
    fail_names: HashSet<String>,
    uploads: Mutex<Vec<PathBuf>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_names.insert(file_name.to_string());
        self
    }

    pub fn uploads(&self) -> Vec<PathBuf> {
        self.uploads
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ObjectHost for ScriptedHost {
    async fn upload(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_names.contains(&name) {
            bail!("HTTP 502 from host");
        }
        let mut g = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        g.push(path.to_path_buf());
        Ok(direct_download_url(&format!(
            "https://tmpfiles.org/{}/{name}",
            g.len()
        )))
    }
}

/// Text generator that always errors.
pub struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("model overloaded")) })
    }
    fn provider_name(&self) -> &'static str {
        "failing"
    }
}
